//! Interactive shell around the agent loop.

use crate::application::agent::{Agent, Termination};
use crate::application::tooling::builtin::run_bash;
use crate::infrastructure::model::ModelProvider;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const BANNER: &str = "orrery interactive session. Type /help for commands.";
const HELP: &str = "\
Commands:
  /help          show this help
  /clear         start a fresh conversation
  /quit          exit
  !<command>     run a shell command directly, outside the conversation
Anything else is sent to the model.";

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
}

pub async fn run<P: ModelProvider>(agent: &mut Agent<P>) -> Result<(), ReplError> {
    println!("{BANNER}");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/help" => {
                println!("{HELP}");
                continue;
            }
            "/clear" => {
                agent.reset();
                println!("Conversation cleared.");
                continue;
            }
            "/quit" => break,
            _ => {}
        }

        if let Some(command) = input.strip_prefix('!') {
            match run_bash(command).await {
                Ok(output) => print!("{output}"),
                Err(err) => println!("{err}"),
            }
            continue;
        }

        match agent.send_user_message(input).await {
            Ok(reply) => {
                println!("{}", reply.text);
                if reply.termination == Termination::StepLimit {
                    println!(
                        "[stopped after the step limit; {} tool calls ran]",
                        reply.steps.len()
                    );
                }
            }
            Err(err) => {
                error!(error = %err, "Turn failed");
                println!("{}", err.user_message());
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}
