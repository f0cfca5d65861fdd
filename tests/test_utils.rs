#![allow(dead_code)]

use aoh_review::llm::{InvocationClient, MockModelClient, RetryPolicy};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const SAMPLE_INSTRUCTIONS: &str = "\
TITLE REQUIREMENTS - ATRQ/T137
An Affidavit of Heirship must state the date of death of the decedent,
the decedent's marital history and every child of the decedent.
\x0c
It must be sworn before a notary with a proper jurat and signed by two
disinterested witnesses who knew the decedent for at least ten years.";

pub const SAMPLE_AOH: &str = "\
AFFIDAVIT OF HEIRSHIP
Date: March 3, 2021
John Doe died on January 1, 2020 in Austin, Travis County, Texas, where he resided.
He was married once, to Jane Doe, who survives him.
Children: Ann Doe and Bob Doe, both living.
The estate has no unpaid debts and no administration is necessary.
Sworn to and subscribed before me. Witnesses: Carl Roe, Dana Poe.";

/// Completion the extraction stage should parse cleanly
pub const SAMPLE_FIELDS_JSON: &str = r#"{
  "date_affidavit": "03/03/2021",
  "deceased_death_date": "01/01/2020",
  "deceased_death_place": "Austin, Travis County, Texas",
  "deceased_residence": "Austin, Texas",
  "deceased_marital": "Married once, to Jane Doe",
  "children_all": ["Ann Doe", "Bob Doe"]
}"#;

/// Wrap a mock in a client with near-zero backoff
pub fn client(mock: &MockModelClient, max_attempts: u32) -> InvocationClient {
    InvocationClient::new(Arc::new(mock.clone()), RetryPolicy::immediate(max_attempts))
}

/// Mock that answers each standard-chain prompt by recognizing its wording
pub fn review_model() -> MockModelClient {
    MockModelClient::with_responder(|request| {
        let prompt = request.prompt.as_str();
        let text = if prompt.contains("bulleted list") {
            "- date of death\n- marital history\n- children"
        } else if prompt.contains("format the output as JSON") {
            SAMPLE_FIELDS_JSON
        } else if prompt.contains("<question>") {
            "Yes. See paragraph 4."
        } else if prompt.contains("corresponding information") {
            "Date of death: January 1, 2020\n</final_answer>"
        } else if prompt.contains("TITLE REQUIREMENTS") {
            "Checklist for heirship affidavits.</summary>"
        } else {
            "Affidavit naming two heirs of John Doe.</summary>"
        };
        Ok(text.to_string())
    })
}

/// Write both sample documents into a temp dir
pub fn sample_documents() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let instructions = dir.path().join("instructions.txt");
    let aoh = dir.path().join("aoh.txt");
    fs::write(&instructions, SAMPLE_INSTRUCTIONS).expect("Failed to write instructions");
    fs::write(&aoh, SAMPLE_AOH).expect("Failed to write affidavit");
    (dir, instructions, aoh)
}
