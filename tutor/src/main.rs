use cefr::{aggregate_levels, CefrLevel};
use clap::{Parser, Subcommand};
use model::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tutor::{
    init_tracing, ChatTopic, ChatTurn, EvaluationStrategy, Examiner, LevelTestSession,
    LlmExaminer, QuestionBank, SessionReport, Tutor, TutorConfig,
};

#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "CEFR level test and English tutor backed by a local language model")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Model override
    #[arg(short, long, global = true)]
    model: Option<String>,
    /// Timeout override for model calls, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a single answer
    Evaluate {
        /// The answer to grade
        #[arg(short, long)]
        answer: String,
    },
    /// Run the level test
    Test {
        /// TOML file with answers keyed by question id (interactive if omitted)
        #[arg(short, long)]
        answers: Option<PathBuf>,
        /// Grade all answers at once
        #[arg(long)]
        concurrent: bool,
    },
    /// Combine levels into one overall level without calling the model
    Aggregate {
        /// Levels such as B1 C1 B2
        #[arg(required = true)]
        levels: Vec<String>,
    },
    /// Chat with the tutor
    Chat {
        /// Topic: IT, Study, Travel, Daily life or Rest
        #[arg(short, long)]
        topic: Option<String>,
        /// Learner level (defaults to A1)
        #[arg(short, long)]
        level: Option<String>,
        /// Single message (if not provided, starts interactive mode)
        #[arg(long)]
        message: Option<String>,
    },
    /// Health check
    Health,
    /// List available models
    Models,
}

#[derive(Deserialize)]
struct AnswerSheet {
    answers: BTreeMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Aggregate { ref levels } => {
            aggregate_offline(levels)?;
        }
        Commands::Evaluate { ref answer } => {
            let config = load_config(&cli)?;
            let provider = OllamaProvider::new(config.provider.clone())?;
            let examiner = LlmExaminer::new(provider, config.examiner.clone());
            evaluate_once(&examiner, answer).await?;
        }
        Commands::Test {
            ref answers,
            concurrent,
        } => {
            let config = load_config(&cli)?;
            let provider = OllamaProvider::new(config.provider.clone())?;
            let examiner = LlmExaminer::new(provider, config.examiner.clone());
            let strategy = if concurrent {
                EvaluationStrategy::Concurrent
            } else {
                EvaluationStrategy::Sequential
            };
            run_level_test(&config, &examiner, answers.as_deref(), strategy).await?;
        }
        Commands::Chat {
            ref topic,
            ref level,
            ref message,
        } => {
            let config = load_config(&cli)?;
            let provider = OllamaProvider::new(config.provider.clone())?;
            let mut tutor = Tutor::new(provider, config.model())
                .with_timeout(Duration::from_secs(config.chat.timeout_secs))
                .with_history_turns(config.chat.history_turns);
            if let Some(topic) = topic {
                tutor = tutor.with_topic(topic.parse::<ChatTopic>()?);
            }
            if let Some(level) = level {
                tutor = tutor.with_level(level.parse::<CefrLevel>()?);
            }

            match message {
                Some(message) => println!("Tutor: {}", tutor.reply(message, &[]).await?),
                None => interactive_chat(&tutor).await?,
            }
        }
        Commands::Health => {
            let config = load_config(&cli)?;
            health_check(&OllamaProvider::new(config.provider)?).await?;
        }
        Commands::Models => {
            let config = load_config(&cli)?;
            list_models(&OllamaProvider::new(config.provider)?).await?;
        }
    }

    Ok(())
}

/// File and environment first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<TutorConfig, Box<dyn std::error::Error>> {
    let mut config = TutorConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.set_model(model.as_str());
    }
    if let Some(secs) = cli.timeout {
        config.set_timeout(Duration::from_secs(secs));
    }
    config.validate()?;
    Ok(config)
}

fn aggregate_offline(labels: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let levels = labels
        .iter()
        .map(|label| label.parse::<CefrLevel>())
        .collect::<Result<Vec<_>, _>>()?;

    let level = aggregate_levels(levels);
    println!("Overall level: {}", level);
    println!("{}", level.summary());
    Ok(())
}

async fn evaluate_once<E: Examiner>(
    examiner: &E,
    answer: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = examiner.evaluate(answer).await?;
    println!("Level: {}", result.level);
    println!("Explanation: {}", result.explanation);
    Ok(())
}

async fn run_level_test<E: Examiner>(
    config: &TutorConfig,
    examiner: &E,
    answers_file: Option<&Path>,
    strategy: EvaluationStrategy,
) -> Result<(), Box<dyn std::error::Error>> {
    let bank = match &config.questions_file {
        Some(path) => QuestionBank::load(path).await?,
        None => QuestionBank::default(),
    };
    let mut session = LevelTestSession::new(bank.into_questions())?;
    info!("Started level test session {}", session.id());

    match answers_file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await?;
            let sheet: AnswerSheet = toml::from_str(&content)?;
            for (question_id, answer) in sheet.answers {
                session.record_answer(&question_id, answer)?;
            }
        }
        None => collect_answers(&mut session)?,
    }

    let progress = session.progress();
    println!(
        "\nAnswered {} of {} questions. Evaluating...",
        progress.answered, progress.total
    );

    let report = session.evaluate(examiner, strategy).await?;
    print_report(&report);
    Ok(())
}

fn collect_answers(session: &mut LevelTestSession) -> Result<(), Box<dyn std::error::Error>> {
    println!("Answer each question in a few sentences. Leave a line empty to skip.\n");

    let questions = session.questions().to_vec();
    let total = questions.len();
    for (index, question) in questions.iter().enumerate() {
        println!("Question {} of {}: {}", index + 1, total, question.text);
        print!("{} ", question.placeholder);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        session.record_answer(&question.id, input.trim())?;
        println!();
    }
    Ok(())
}

fn print_report(report: &SessionReport) {
    println!();
    for evaluation in &report.evaluations {
        println!(
            "  Question {}: {} - {}",
            evaluation.question_id, evaluation.level, evaluation.explanation
        );
    }
    for skipped in &report.skipped {
        println!(
            "  Question {}: skipped ({})",
            skipped.question_id, skipped.reason
        );
    }

    println!("\nYour level: {}", report.result.level);
    println!("{}", report.result.explanation);
    if report.is_partial() {
        println!(
            "\nNote: {} answer(s) could not be graded; the level is based on the rest.",
            report.skipped.len()
        );
    }
}

async fn interactive_chat<P: ModelProvider>(
    tutor: &Tutor<P>,
) -> Result<(), Box<dyn std::error::Error>> {
    let topic = tutor.topic().map_or("general conversation", ChatTopic::as_str);
    println!("Chatting with your {} tutor about {}", tutor.level(), topic);
    println!("Type 'quit' or 'exit' to end the conversation.\n");

    let mut history: Vec<ChatTurn> = Vec::new();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }

        let reply = tutor.reply(input, &history).await?;
        println!("Tutor: {}\n", reply);

        history.push(ChatTurn::user(input));
        history.push(ChatTurn::bot(reply));
    }

    Ok(())
}

async fn list_models(provider: &OllamaProvider) -> Result<(), Box<dyn std::error::Error>> {
    println!("Available models:");
    let models = provider.list_models().await?;

    if models.is_empty() {
        println!("  No models found. Make sure Ollama is running and has models installed.");
    } else {
        for model in models {
            println!(
                "  - {} ({})",
                model.name,
                model
                    .size
                    .map(|s| format!("{:.1} GB", s as f64 / 1_000_000_000.0))
                    .unwrap_or_else(|| "unknown size".to_string())
            );
        }
    }

    Ok(())
}

async fn health_check(provider: &OllamaProvider) -> Result<(), Box<dyn std::error::Error>> {
    println!("Performing health check...");

    match provider.health_check().await {
        Ok(()) => {
            println!("✓ Health check passed. Ollama is running and accessible.");
            info!("Health check successful");
        }
        Err(e) => {
            println!("✗ Health check failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
