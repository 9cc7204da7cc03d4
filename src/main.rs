use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use task_group::context::TaskContext;
use task_group::error::TaskError;
use task_group::group::{Task, TaskCompletedEvent, TaskGroup};
use task_group::history::LlmSummarizer;
use task_group::llm::{ChatMessage, LlmConfig, create_provider};
use task_group::tools::builtin::REVISIT_TASKS_TOOL;
use task_group::GroupConfig;

type SharedStdin = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Asks one question on the terminal and returns the answer.
///
/// `/back <id>[,<id>...]` asks to revisit earlier questions instead.
struct PromptTask {
    question: &'static str,
    validate: fn(&str) -> Result<(), &'static str>,
    input: SharedStdin,
}

impl PromptTask {
    async fn read_line(&self) -> Result<String, TaskError> {
        eprint!("> ");
        let mut lines = self.input.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(TaskError::failed("stdin closed")),
        }
    }
}

#[async_trait]
impl Task for PromptTask {
    async fn run(&mut self, ctx: &mut TaskContext) -> Result<serde_json::Value, TaskError> {
        if let Some(handle) = ctx.regression() {
            let ids: Vec<&str> = handle.eligible().iter().map(|t| t.id.as_str()).collect();
            eprintln!("   (type /back {} to change an earlier answer)", ids.join(","));
        }

        loop {
            println!("{}", self.question);
            ctx.history.add_message(ChatMessage::assistant(self.question));

            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }
            ctx.history.add_message(ChatMessage::user(&line));

            if let Some(rest) = line.strip_prefix("/back") {
                let ids: Vec<&str> = rest
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .collect();
                match ctx
                    .call_tool(REVISIT_TASKS_TOOL, serde_json::json!({ "task_ids": ids }))
                    .await
                {
                    // The group drops this task once the request is accepted.
                    Ok(_) => return std::future::pending().await,
                    Err(e) => {
                        eprintln!("❌ {}", e);
                        continue;
                    }
                }
            }

            match (self.validate)(&line) {
                Ok(()) => return Ok(serde_json::Value::String(line)),
                Err(reason) => eprintln!("❌ {}", reason),
            }
        }
    }
}

fn non_empty(answer: &str) -> Result<(), &'static str> {
    if answer.chars().any(char::is_alphanumeric) {
        Ok(())
    } else {
        Err("Please enter a name")
    }
}

fn looks_like_email(answer: &str) -> Result<(), &'static str> {
    match answer.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err("That doesn't look like an email address"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GroupConfig::from_env().context("invalid task group configuration")?;

    eprintln!("📋 Task Group v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Failures: {}",
        if config.collect_failures { "collect" } else { "fail fast" }
    );
    eprintln!(
        "   Summary: {}\n",
        if config.summarize_history { "on" } else { "off" }
    );

    let mut group = TaskGroup::new(config.clone()).on_task_completed(|event: &TaskCompletedEvent| {
        eprintln!("✅ {} → {}", event.task_id, event.result);
        Ok(())
    });

    if config.summarize_history {
        let llm_config = LlmConfig::from_env().context("summarization needs an LLM")?;
        let llm = create_provider(&llm_config)?;
        group = group.with_summarizer(Arc::new(LlmSummarizer::new(llm)));
    }

    let input: SharedStdin = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));

    let name_input = Arc::clone(&input);
    group.add(
        move || PromptTask {
            question: "What's your name?",
            validate: non_empty,
            input: Arc::clone(&name_input),
        },
        "name",
        "Collect the user's name",
    );
    let email_input = Arc::clone(&input);
    group.add(
        move || PromptTask {
            question: "What's your email address?",
            validate: looks_like_email,
            input: Arc::clone(&email_input),
        },
        "email",
        "Collect the user's email address",
    );

    let result = group.run().await?;
    println!("{}", serde_json::to_string_pretty(&result.results)?);

    if config.summarize_history {
        for message in group.history().messages() {
            println!("\n{}", message.content);
        }
    }

    Ok(())
}
