use crate::commands::{self, CheckArgs};
use crate::config::ConfigUpdate;
use crate::log_debug;
use crate::output;
use crate::providers::Provider;
use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand, crate_version};
use colored::Colorize;

const LOG_FILE: &str = "aoh-review-debug.log";

/// CLI structure defining the available commands and global arguments
#[derive(Parser)]
#[command(
    author,
    version = crate_version!(),
    about = "Review an Affidavit of Heirship against a title-insurance checklist",
    long_about = "Chains foundation-model prompts to pull the checklist requirements out of an instruction document, check an Affidavit of Heirship against them, extract its key fields and answer the required-element questions.",
    disable_version_flag = true,
    after_help = get_dynamic_help(),
    styles = get_styles(),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug messages to a file
    #[arg(
        short = 'l',
        long = "log",
        global = true,
        help = "Log debug messages to a file"
    )]
    pub log: bool,

    /// Specify a custom log file path
    #[arg(
        long = "log-file",
        global = true,
        help = "Specify a custom log file path"
    )]
    pub log_file: Option<String>,

    /// Mirror log lines to stderr
    #[arg(
        long = "log-stderr",
        global = true,
        help = "Mirror log lines to stderr (also enabled by AOH_REVIEW_VERBOSE)"
    )]
    pub log_stderr: bool,

    /// Suppress non-essential output
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress non-essential output"
    )]
    pub quiet: bool,

    /// Display the version
    #[arg(
        short = 'v',
        long = "version",
        global = true,
        help = "Display the version"
    )]
    pub version: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full review chain over two documents
    #[command(
        about = "Review an affidavit against an instruction document",
        long_about = "Load the instruction document and the affidavit, run every review stage in order and print the results. Partial results are printed when a stage fails."
    )]
    Check {
        /// Instruction (checklist) document
        #[arg(long, help = "Path to the instruction document (plain text, form feeds split pages)")]
        instructions: String,

        /// Affidavit under review
        #[arg(long, help = "Path to the affidavit text")]
        document: String,

        #[arg(long, help = "Override the default provider")]
        provider: Option<String>,

        #[arg(long, help = "Override the model for this run")]
        model: Option<String>,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,

        #[arg(short, long, help = "Print the report without colors")]
        print: bool,

        #[arg(
            long,
            help = "Run the chain against a canned offline model instead of the provider"
        )]
        dry_run: bool,
    },

    #[command(about = "Configure providers, sampling and retry settings")]
    Config {
        #[arg(long, help = "Set the default provider")]
        provider: Option<String>,

        #[arg(long, help = "Set model for the default provider")]
        model: Option<String>,

        #[arg(
            long,
            help = "Set the base URL for the default provider (empty to reset)"
        )]
        endpoint: Option<String>,

        #[arg(
            long,
            help = "Set additional parameters for the default provider (key=value)"
        )]
        param: Option<Vec<String>>,

        #[arg(long, help = "Total attempts per model call, including the first")]
        max_attempts: Option<u32>,

        #[arg(long, help = "Per-call timeout in seconds")]
        timeout_secs: Option<u64>,

        #[arg(long, help = "Token budget for documents embedded in prompts")]
        max_document_tokens: Option<usize>,

        #[arg(long, help = "Whose requirements the instruction document sets out")]
        authority: Option<String>,

        #[arg(long, help = "Requirement code within the instruction document")]
        code: Option<String>,
    },

    #[command(about = "List the extraction fields and compliance questions in use")]
    Schema,
}

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

fn get_dynamic_help() -> String {
    let providers = Provider::ALL
        .iter()
        .map(|p| format!("{} ({})", p.name().bold(), p.api_key_env()))
        .collect::<Vec<_>>()
        .join(" • ");

    format!("\nAvailable providers: {providers}")
}

/// Main function to parse arguments and handle the command
pub async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    if cli.version {
        println!("aoh-review {}", crate_version!());
        return Ok(());
    }

    let log_file = cli
        .log
        .then(|| cli.log_file.as_deref().unwrap_or(LOG_FILE));
    let to_stderr = cli.log_stderr || crate::logger::verbose_requested();
    crate::logger::configure(log_file, to_stderr)?;

    if cli.quiet {
        output::set_quiet_mode(true);
    }

    if let Some(command) = cli.command {
        handle_command(command).await
    } else {
        let _ = Cli::parse_from(["aoh-review", "--help"]);
        Ok(())
    }
}

pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Check {
            instructions,
            document,
            provider,
            model,
            json,
            print,
            dry_run,
        } => {
            log_debug!(
                "Handling 'check' command with instructions: {}, document: {}, provider: {:?}, model: {:?}",
                instructions,
                document,
                provider,
                model
            );
            commands::handle_check_command(CheckArgs {
                instructions,
                document,
                provider,
                model,
                json,
                plain: print,
                dry_run,
            })
            .await
        }
        Commands::Config {
            provider,
            model,
            endpoint,
            param,
            max_attempts,
            timeout_secs,
            max_document_tokens,
            authority,
            code,
        } => {
            let update = ConfigUpdate {
                provider,
                model,
                endpoint,
                params: param.map(|p| commands::parse_additional_params(&p)),
                max_attempts,
                timeout_secs,
                max_document_tokens,
                authority,
                code,
            };
            log_debug!("Handling 'config' command with {:?}", update);
            commands::handle_config_command(update)
        }
        Commands::Schema => commands::handle_schema_command(),
    }
}
