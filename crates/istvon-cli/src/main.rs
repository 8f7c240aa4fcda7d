//! ISTVON CLI: run one prompt through the decision pipeline and print the outcome as JSON.
//!
//! Usage:
//!   cargo run -p istvon-cli -- [--enhance] [--guided] [--example NAME | PROMPT...]
//!   cargo run -p istvon-cli -- --list
//!
//! Settings come from `ISTVON_CONFIG` and `ISTVON__*` variables. `--enhance` uses OpenRouter
//! when `OPENROUTER_API_KEY` is set and falls back to the rule-based map otherwise.

use istvon_core::samples::{example, example_names};
use istvon_core::{
    AuditSink, DisabledEnhancer, Enhancer, IstvonEngine, OpenRouterEnhancer, TracingAuditSink,
};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn print_usage() {
    eprintln!("ISTVON: prompt safety, COSTAR gap analysis and slot mapping");
    eprintln!("  istvon [--enhance] [--guided] PROMPT...   Process a prompt");
    eprintln!("  istvon [--enhance] --example NAME          Process a bundled example prompt");
    eprintln!("  istvon --list                              List bundled example prompts");
    eprintln!();
    eprintln!("  --enhance   Offer incomplete maps to the LLM enhancer (needs OPENROUTER_API_KEY)");
    eprintln!("  --guided    Also print the prompt with guidance for missing COSTAR elements");
}

/// What the command line asked for.
#[derive(Debug, PartialEq)]
enum Command {
    Help,
    List,
    Process {
        prompt: String,
        enhance: bool,
        guided: bool,
    },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut enhance = false;
    let mut guided = false;
    let mut example_name: Option<String> = None;
    let mut words: Vec<String> = Vec::new();

    let mut args = args.into_iter();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--enhance" => enhance = true,
            "--guided" => guided = true,
            "--example" => match args.next() {
                Some(name) => example_name = Some(name),
                None => return Err("--example requires a NAME (see --list)".to_string()),
            },
            "--list" => return Ok(Command::List),
            "-h" | "--help" => return Ok(Command::Help),
            _ => words.push(a),
        }
    }

    let prompt = match example_name {
        Some(name) => match example(&name) {
            Some(prompt) => prompt.to_string(),
            None => {
                return Err(format!(
                    "unknown example `{name}`; known: {}",
                    example_names().collect::<Vec<_>>().join(", ")
                ))
            }
        },
        None => words.join(" "),
    };
    if prompt.trim().is_empty() {
        return Ok(Command::Help);
    }
    Ok(Command::Process {
        prompt,
        enhance,
        guided,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let (prompt, enhance, guided) = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::List => {
            for name in example_names() {
                println!("{name}");
            }
            return Ok(());
        }
        Command::Process {
            prompt,
            enhance,
            guided,
        } => (prompt, enhance, guided),
    };

    let engine = IstvonEngine::from_env()?;
    info!(
        "ISTVON engine ready (max prompt length {})",
        engine.settings().max_prompt_length
    );

    let outcome = if enhance {
        let enhancer: Box<dyn Enhancer> = match OpenRouterEnhancer::from_env() {
            Some(openrouter) => {
                info!("Enhancer: OpenRouter ({})", openrouter.model());
                Box::new(openrouter)
            }
            None => {
                warn!("OPENROUTER_API_KEY not set; using rule-based mapping only");
                Box::new(DisabledEnhancer)
            }
        };
        engine.process_with_enhancer(&prompt, enhancer.as_ref()).await?
    } else {
        engine.process(&prompt)?
    };

    TracingAuditSink.record(&outcome.audit_record());
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if guided {
        if let Some(text) = outcome.guided_prompt() {
            println!();
            println!("{text}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prompt_words_are_joined() {
        assert_eq!(
            parse_args(args(&["--guided", "Write", "a", "memo"])),
            Ok(Command::Process {
                prompt: "Write a memo".to_string(),
                enhance: false,
                guided: true,
            })
        );
    }

    #[test]
    fn known_example_is_resolved() {
        let Ok(Command::Process { prompt, enhance, .. }) =
            parse_args(args(&["--enhance", "--example", "blog_post"]))
        else {
            panic!("expected a prompt");
        };
        assert!(enhance);
        assert_eq!(Some(prompt.as_str()), example("blog_post"));
    }

    #[test]
    fn unknown_example_is_an_error() {
        let err = parse_args(args(&["--example", "sonnet"])).expect_err("unknown example");
        assert!(err.contains("sonnet"));
        assert!(err.contains("business_email"));
    }

    #[test]
    fn example_without_name_is_an_error() {
        assert!(parse_args(args(&["Write", "--example"])).is_err());
    }

    #[test]
    fn no_prompt_shows_help() {
        assert_eq!(parse_args(Vec::new()), Ok(Command::Help));
        assert_eq!(parse_args(args(&["--list", "x"])), Ok(Command::List));
    }
}
