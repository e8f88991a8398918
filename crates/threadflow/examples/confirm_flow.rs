// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Confirmation dialogue over a single thread: a command intent pauses the
//! graph at a confirm boundary, and a later step resumes it with the
//! user's answer.
//!
//! Run with: cargo run --example confirm_flow

use std::collections::HashMap;
use threadflow::{MemoryCheckpointer, State, StateGraph, END};

#[tokio::main]
async fn main() -> threadflow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("threadflow=debug".parse().unwrap()),
        )
        .init();

    let mut graph = StateGraph::new();

    graph.add_node_from_fn("classify", |state: State| {
        Box::pin(async move {
            let input = state.get_str("user_input").unwrap_or("");
            let intent = if input.starts_with('/') {
                "command"
            } else {
                "chitchat"
            };
            Ok(State::new().with("intent", intent))
        })
    })?;

    graph.add_node_from_fn("command", |state: State| {
        Box::pin(async move {
            let cmd = state.get_str("user_input").unwrap_or("").to_string();
            Ok(State::new().with("pending_command", cmd))
        })
    })?;

    graph.add_node_from_fn("confirm", |state: State| {
        Box::pin(async move {
            let cmd = state.get_str("pending_command").unwrap_or("");
            Ok(State::new().with("llm_output", format!("Run '{cmd}'? (yes/no)")))
        })
    })?;

    graph.add_node_from_fn("approve", |_state: State| {
        Box::pin(async move {
            Ok(State::new()
                .with("confirmed_command", true)
                .with("llm_output", "Command executed."))
        })
    })?;

    graph.add_node_from_fn("cancel", |_state: State| {
        Box::pin(async move {
            Ok(State::new()
                .with("confirmed_command", false)
                .with("llm_output", "Cancelled."))
        })
    })?;

    graph.add_node_from_fn("chat", |_state: State| {
        Box::pin(async move { Ok(State::new().with("llm_output", "How can I help?")) })
    })?;

    graph.set_entry_point("classify")?;

    let mut intents = HashMap::new();
    intents.insert("command".to_string(), "command".to_string());
    intents.insert("chitchat".to_string(), "chat".to_string());
    graph.add_conditional_edges(
        "classify",
        |state: &State| state.get_str("intent").unwrap_or("chitchat").to_string(),
        intents,
    )?;

    graph.add_edge("command", "confirm")?;

    let mut answers = HashMap::new();
    answers.insert("yes".to_string(), "approve".to_string());
    answers.insert("no".to_string(), "cancel".to_string());
    answers.insert("wait".to_string(), END.to_string());
    graph.add_conditional_edges(
        "confirm",
        |state: &State| match state.get_str("user_input") {
            Some("yes") => "yes".to_string(),
            Some("no") => "no".to_string(),
            _ => "wait".to_string(),
        },
        answers,
    )?;

    graph.add_edge("approve", END)?;
    graph.add_edge("cancel", END)?;
    graph.add_edge("chat", END)?;

    let app = graph.compile()?.with_checkpointer(MemoryCheckpointer::new());

    println!("user: /restart api-server");
    let state = app
        .step("demo-thread", State::new().with("user_input", "/restart api-server"))
        .await?;
    println!("bot:  {}", state.get_str("llm_output").unwrap_or(""));

    let snapshot = app.get_state("demo-thread").await?;
    println!("      (paused at {:?})", snapshot.pending_node);

    println!("user: yes");
    let state = app
        .step("demo-thread", State::new().with("user_input", "yes"))
        .await?;
    println!("bot:  {}", state.get_str("llm_output").unwrap_or(""));
    println!(
        "      (confirmed_command = {:?})",
        state.get_bool("confirmed_command")
    );

    Ok(())
}
