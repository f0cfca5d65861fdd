//! Built-in prompts for the affidavit review chain.

use super::template::PromptTemplate;

const REQUIREMENTS: &str = "\
You are a helpful assistant to a title examiner. From the instruction document below, \
please provide a bulleted list of the {authority} requirements as set forth in code {code}.

<instruction_document>
{instruction_text}
</instruction_document>
";

const COMPLIANCE: &str = "\
For each of the requirements you can identify in the instructions, extract the \
corresponding information from the document.

<instruction>
{instructions}
</instruction>

<document>
{aoh_text}
</document>

<final_answer>";

const EXTRACTION: &str = "\
You are a helpful assistant. Please extract the following details from the document \
and format the output as JSON using the keys. Put dates in MM/DD/YYYY format.

<details>
{details}
</details>

<keys>
{keys}
</keys>

<document>
{aoh_text}
</document>

<final_answer>";

const QUESTION: &str = "\
You are a helpful assistant. Please answer the following question about the document. \
Answer Yes or No and provide a reference in the document.

<question>
{question}
</question>

<document>
{aoh_text}
</document>
";

const SUMMARY: &str = "\
Given a full document, give me a concise summary.

<document>{document}</document>
<summary>";

/// Requirement extraction from the instruction document.
pub fn requirements() -> PromptTemplate {
    PromptTemplate::new(REQUIREMENTS)
}

/// Apply extracted requirements to the affidavit.
pub fn compliance() -> PromptTemplate {
    PromptTemplate::new(COMPLIANCE)
}

/// Structured field extraction; `details` and `keys` come from the schema.
pub fn extraction() -> PromptTemplate {
    PromptTemplate::new(EXTRACTION)
}

/// One compliance question against the affidavit.
pub fn question() -> PromptTemplate {
    PromptTemplate::new(QUESTION)
}

/// Concise summary of any document bound to `document`.
pub fn summary() -> PromptTemplate {
    PromptTemplate::new(SUMMARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_declares_expected_variables() {
        let names = |t: PromptTemplate| {
            t.required_variables()
                .iter()
                .cloned()
                .collect::<Vec<String>>()
        };
        assert_eq!(
            names(requirements()),
            vec!["authority", "code", "instruction_text"]
        );
        assert_eq!(names(compliance()), vec!["aoh_text", "instructions"]);
        assert_eq!(names(extraction()), vec!["aoh_text", "details", "keys"]);
        assert_eq!(names(question()), vec!["aoh_text", "question"]);
        assert_eq!(names(summary()), vec!["document"]);
    }
}
