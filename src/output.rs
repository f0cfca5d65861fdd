//! Terminal rendering for reports, configuration and schema listings.

use colored::Colorize;
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::config::Config;
use crate::extraction::{ExtractedRecord, ExtractionSchema};
use crate::pipeline::ReviewReport;
use crate::qa::ComplianceQuestion;
use crate::session::Phase;

/// RGB tuples for `colored`'s `.truecolor()`
pub mod rgb {
    pub const ACCENT: (u8, u8, u8) = (225, 53, 255);
    pub const CYAN: (u8, u8, u8) = (128, 255, 234);
    pub const CORAL: (u8, u8, u8) = (255, 106, 193);
    pub const YELLOW: (u8, u8, u8) = (241, 250, 140);
    pub const GREEN: (u8, u8, u8) = (80, 250, 123);
    pub const RED: (u8, u8, u8) = (255, 99, 99);
    pub const DIM: (u8, u8, u8) = (180, 180, 190);
    pub const SEPARATOR: (u8, u8, u8) = (60, 60, 70);
}

static QUIET_MODE: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));

pub fn set_quiet_mode(enabled: bool) {
    *QUIET_MODE.lock() = enabled;
}

pub fn is_quiet_mode() -> bool {
    *QUIET_MODE.lock()
}

pub fn print_info(message: &str) {
    if !is_quiet_mode() {
        println!("{}", message.cyan().bold());
    }
}

pub fn print_warning(message: &str) {
    if !is_quiet_mode() {
        println!("{}", message.yellow().bold());
    }
}

pub fn print_error(message: &str) {
    // Errors print even in quiet mode
    eprintln!("{}", message.red().bold());
}

pub fn print_success(message: &str) {
    if !is_quiet_mode() {
        println!("{}", message.green().bold());
    }
}

fn paint(text: &str, color: (u8, u8, u8)) -> colored::ColoredString {
    text.truecolor(color.0, color.1, color.2)
}

fn section_header(name: &str) -> String {
    format!(
        "{} {} {}",
        paint("─", rgb::ACCENT),
        paint(name, rgb::ACCENT).bold(),
        paint(&"─".repeat(40 - name.len().min(38)), rgb::SEPARATOR)
    )
}

fn row(label: &str, value: &str, color: (u8, u8, u8)) -> String {
    format!("{}  {}", paint(&format!("{label:>22}"), rgb::DIM), paint(value, color))
}

fn text_section(out: &mut String, title: &str, body: Option<&str>) {
    let _ = writeln!(out, "{}", section_header(title));
    match body {
        Some(text) => {
            let _ = writeln!(out, "{}\n", text.trim());
        }
        None => {
            let _ = writeln!(out, "{}\n", paint("(not produced)", rgb::DIM).italic());
        }
    }
}

fn record_section(out: &mut String, record: Option<&ExtractedRecord>) {
    let _ = writeln!(out, "{}", section_header("AOH FIELD DETAILS"));
    let Some(record) = record else {
        let _ = writeln!(out, "{}\n", paint("(not produced)", rgb::DIM).italic());
        return;
    };

    for (name, value) in record.fields() {
        let line = match value {
            Some(v) if !v.is_empty() => row(name, v, rgb::CYAN),
            Some(_) => row(name, "(empty)", rgb::DIM),
            None => row(name, "(unparsed)", rgb::YELLOW),
        };
        let _ = writeln!(out, "{line}");
    }
    if let Some(error) = record.parse_error() {
        let _ = writeln!(
            out,
            "\n{} {}",
            paint("Could not parse the model output:", rgb::YELLOW).bold(),
            error
        );
        let _ = writeln!(out, "{}", record.raw_text().trim());
    }
    out.push('\n');
}

/// Render a review report as colored terminal text
pub fn format_report(report: &ReviewReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{}  {}  {}\n",
        paint("━━━", rgb::ACCENT),
        paint("AFFIDAVIT OF HEIRSHIP REVIEW", rgb::CYAN).bold(),
        paint("━━━", rgb::ACCENT)
    );

    text_section(&mut out, "INSTRUCTION SUMMARY", report.instruction_summary.as_deref());
    text_section(&mut out, "COMPLIANCE", report.compliance_narrative.as_deref());
    record_section(&mut out, report.extracted_record.as_ref());

    let _ = writeln!(out, "{}", section_header("REQUIRED ELEMENTS"));
    if report.compliance_answers.is_empty() {
        let _ = writeln!(out, "{}", paint("(not produced)", rgb::DIM).italic());
    }
    for (index, answer) in report.compliance_answers.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {}",
            paint(&format!("{}.", index + 1), rgb::CORAL).bold(),
            paint(&answer.question, rgb::DIM)
        );
        let _ = writeln!(out, "   {}\n", answer.raw_text.trim());
    }
    out.push('\n');

    text_section(&mut out, "DOCUMENT SUMMARY", report.document_summary.as_deref());

    let status = match &report.outcome {
        Phase::Done => paint("complete", rgb::GREEN).bold(),
        Phase::Failed { stage, reason } => {
            paint(&format!("failed in '{stage}': {reason}"), rgb::RED).bold()
        }
        other => paint(&other.to_string(), rgb::YELLOW),
    };
    let _ = writeln!(out, "{} {}", paint("Status:", rgb::DIM), status);
    out
}

pub fn print_report(report: &ReviewReport) {
    print!("{}", format_report(report));
}

/// Display the active configuration
pub fn print_configuration(config: &Config) {
    println!();
    println!(
        "{}  {}  {}",
        paint("━━━", rgb::ACCENT),
        paint("AOH REVIEW CONFIGURATION", rgb::CYAN).bold(),
        paint("━━━", rgb::ACCENT)
    );
    println!();

    println!("{}", section_header("GLOBAL"));
    println!("{}", row("Provider", &config.default_provider, rgb::CYAN));
    println!(
        "{}",
        row(
            "Checklist",
            &format!("{} / {}", config.checklist.authority, config.checklist.code),
            rgb::YELLOW
        )
    );
    if let Some(tokens) = config.max_document_tokens {
        println!("{}", row("Document tokens", &tokens.to_string(), rgb::CORAL));
    }

    println!();
    println!("{}", section_header("SAMPLING"));
    let s = &config.sampling;
    println!("{}", row("max_tokens", &s.max_tokens.to_string(), rgb::CORAL));
    println!("{}", row("temperature", &s.temperature.to_string(), rgb::CORAL));
    println!("{}", row("top_k", &s.top_k.to_string(), rgb::CORAL));
    println!("{}", row("top_p", &s.top_p.to_string(), rgb::CORAL));

    println!();
    println!("{}", section_header("RETRY"));
    let r = &config.retry;
    println!("{}", row("max_attempts", &r.max_attempts.to_string(), rgb::CORAL));
    println!("{}", row("base_delay_ms", &r.base_delay_ms.to_string(), rgb::CORAL));
    println!("{}", row("timeout_ms", &r.timeout_ms.to_string(), rgb::CORAL));

    let mut providers: Vec<_> = config.providers.iter().collect();
    providers.sort_by_key(|(name, _)| name.as_str());
    for (name, provider_config) in providers {
        println!();
        let header = if *name == config.default_provider {
            format!("{} ✦", name.to_uppercase())
        } else {
            name.to_uppercase()
        };
        println!("{}", section_header(&header));
        let model = if provider_config.model.is_empty() {
            "(default)"
        } else {
            provider_config.model.as_str()
        };
        println!("{}", row("Model", model, rgb::CYAN));
        if let Some(endpoint) = &provider_config.endpoint {
            println!("{}", row("Endpoint", endpoint, rgb::DIM));
        }
        let mut params: Vec<_> = provider_config.additional_params.iter().collect();
        params.sort();
        for (key, value) in params {
            println!("{}", row(key, value, rgb::DIM));
        }
    }

    println!();
    println!("{}", paint(&"─".repeat(44), rgb::SEPARATOR));
    println!();
}

/// List the extraction fields and compliance questions in use
pub fn print_schema(schema: &ExtractionSchema, questions: &[ComplianceQuestion]) {
    println!("\n{}", section_header("EXTRACTION FIELDS"));
    for field in schema.fields() {
        println!("{}", row(&field.name, &field.description, rgb::CYAN));
    }
    println!("\n{}", section_header("COMPLIANCE QUESTIONS"));
    for (index, question) in questions.iter().enumerate() {
        println!(
            "{} {}",
            paint(&format!("{:>3}.", index + 1), rgb::CORAL).bold(),
            question.text
        );
    }
    println!();
}
