//! Response Formatter (C11)
//!
//! Assembles the final answer text and enforces the mandatory five-part
//! structure every response must carry before it reaches the Protection
//! Kernel's pre-emit check.

use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub understanding: String,
    pub challenge: String,
    pub response: String,
    pub next_steps: String,
}

/// Render `parts` into the five mandatory sections plus the trailing trace
/// footer. The section headers are the stable markers the Protection
/// Kernel and any downstream test assert on.
pub fn format_response(parts: &ResponseParts, trace_id: &Uuid) -> String {
    format!(
        "## Understanding\n{}\n\n## Challenge\n{}\n\n## Response\n{}\n\n## Next Steps\n{}\n\n---\n*trace: {}*\n",
        parts.understanding.trim(),
        if parts.challenge.trim().is_empty() { "No concerns identified." } else { parts.challenge.trim() },
        parts.response.trim(),
        if parts.next_steps.trim().is_empty() { "None." } else { parts.next_steps.trim() },
        trace_id,
    )
}

pub const REQUIRED_SECTIONS: [&str; 4] =
    ["## Understanding", "## Challenge", "## Response", "## Next Steps"];

pub fn has_mandatory_structure(text: &str) -> bool {
    REQUIRED_SECTIONS.iter().all(|marker| text.contains(marker)) && text.contains("*trace:")
}
