//! Progress display for background runs
//!
//! The worker never touches the terminal. This module polls its event channel
//! on a fixed interval, feeds a progress bar (or prints JSON lines) and turns
//! Ctrl-C into a cancellation request.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tabload_engine::{ProgressEvent, RunHandle, RunOutcome};
use tokio::time::MissedTickBehavior;

use crate::error::Result;

/// Create a percent bar for a run
pub fn create_run_progress(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// How events reach the user
pub enum EventSink {
    Bar(ProgressBar),
    Json,
}

impl EventSink {
    pub fn new(json: bool, message: &str) -> Self {
        if json {
            EventSink::Json
        } else {
            EventSink::Bar(create_run_progress(message))
        }
    }

    pub fn render(&self, event: &ProgressEvent) -> Result<()> {
        match self {
            EventSink::Json => println!("{}", event_json(event)?),
            EventSink::Bar(pb) => match event {
                ProgressEvent::Log { message } => pb.println(message),
                ProgressEvent::Progress { percent, label } => {
                    pb.set_position(u64::from(*percent));
                    pb.set_message(label.clone());
                }
                ProgressEvent::Error { message } => {
                    pb.println(format!("{} {}", "✗".red(), message))
                }
                ProgressEvent::Completed { .. } | ProgressEvent::Cancelled { .. } => {}
            },
        }
        Ok(())
    }

    /// Print a note outside the event stream
    pub fn note(&self, message: &str) {
        match self {
            EventSink::Bar(pb) => pb.println(message),
            EventSink::Json => eprintln!("{}", message),
        }
    }

    fn finish(&self) {
        if let EventSink::Bar(pb) = self {
            pb.finish_and_clear();
        }
    }
}

/// One event as a single JSON line
pub fn event_json(event: &ProgressEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Poll `handle` until its run ends and return the outcome.
///
/// Events are drained without blocking every `poll_interval`. The first
/// Ctrl-C cancels the run; the loop then keeps draining until the worker
/// publishes its terminal event.
pub async fn drive(mut handle: RunHandle, poll_interval: Duration, sink: &EventSink) -> Result<RunOutcome> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    handle.cancel();
                    sink.note("Cancelling after the current step...");
                }
            }
        }

        let mut terminal = false;
        for event in handle.events().drain() {
            terminal |= event.is_terminal();
            sink.render(&event)?;
        }
        if terminal || handle.is_finished() {
            break;
        }
    }

    let (outcome, rest) = handle.finish().await;
    for event in &rest {
        sink.render(event)?;
    }
    sink.finish();
    Ok(outcome)
}
