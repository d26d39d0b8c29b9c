//! Prompt templates for header discovery and per-document extraction

/// Prompt builder for extraction requests
pub struct PromptBuilder;

impl PromptBuilder {
    /// Ask the model to propose column headers for a set of sample documents
    pub fn build_header_prompt(filenames: &[&str]) -> String {
        format!(
            r#"You are a data-entry assistant preparing a spreadsheet from scanned documents.

The attached documents are samples from one batch:
{files}

Identify the fields that appear across these documents and would make useful
spreadsheet columns (for example: invoice number, date, vendor, total amount).

RULES:
1. Use short, human-readable column names in Title Case
2. Do not include a serial-number column or a document-name column
3. Order the columns the way a person would read the document
4. Return at most 20 columns

Respond with JSON only, in exactly this shape:
{{"headers": ["Column One", "Column Two"]}}"#,
            files = Self::format_file_list(filenames),
        )
    }

    /// Ask the model to fill one record for a single document
    pub fn build_extraction_prompt(content_headers: &[String], instructions: &str) -> String {
        let mut prompt = String::from(
            "You are a data-entry assistant. Extract the requested fields from the attached document.\n\n",
        );

        prompt.push_str("FIELDS (use these exact keys):\n");
        for header in content_headers {
            prompt.push_str(&format!("- {}\n", header));
        }
        prompt.push('\n');

        prompt.push_str("RULES:\n");
        prompt.push_str("1. Copy values as they appear in the document; do not invent data\n");
        prompt.push_str("2. Use null for any field that is not present\n");
        prompt.push_str("3. Return every key listed above, and no others\n\n");

        let instructions = instructions.trim();
        if !instructions.is_empty() {
            prompt.push_str("ADDITIONAL INSTRUCTIONS:\n");
            prompt.push_str(instructions);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Respond with a single JSON object only.");
        prompt
    }

    fn format_file_list(filenames: &[&str]) -> String {
        filenames
            .iter()
            .enumerate()
            .map(|(i, name)| format!("[{}] {}", i + 1, name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_lists_headers_in_order() {
        let headers = vec!["Invoice Number".to_string(), "Total".to_string()];
        let prompt = PromptBuilder::build_extraction_prompt(&headers, "  dates as YYYY-MM-DD ");

        let invoice = prompt.find("- Invoice Number").unwrap();
        let total = prompt.find("- Total").unwrap();
        assert!(invoice < total);
        assert!(prompt.contains("ADDITIONAL INSTRUCTIONS:\ndates as YYYY-MM-DD\n"));
    }

    #[test]
    fn test_blank_instructions_omitted() {
        let prompt = PromptBuilder::build_extraction_prompt(&["Total".to_string()], "   ");
        assert!(!prompt.contains("ADDITIONAL INSTRUCTIONS"));
    }

    #[test]
    fn test_header_prompt_numbers_files() {
        let prompt = PromptBuilder::build_header_prompt(&["a.pdf", "b.png"]);
        assert!(prompt.contains("[1] a.pdf\n[2] b.png"));
        assert!(prompt.contains(r#"{"headers": ["Column One", "Column Two"]}"#));
    }
}
