//! Chats with the demo agents in the terminal, or serves the web chat.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, bail};
use flash_agent::demos::{Demo, DemoOptions, Problems};
use flash_agent::{Session, SessionBuilder, Settings};
use flash_agent_openai_model::OpenAIProvider;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const USAGE: &str = "usage: flash-agent [DEMO] | serve [ADDR] | list";
const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const BAR_CHAR: &str = "▎";

enum Command {
    Chat(Demo),
    Serve(SocketAddr),
    List,
    Help,
}

enum SessionEvent {
    ToolCall(String),
    AgentChanged(String),
    Problem(Problems),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    match dotenv {
        Ok(path) => debug!("loaded {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("failed to load .env: {err}"),
    }

    let command = parse_args(env::args().skip(1))?;
    match command {
        Command::List => {
            for demo in Demo::ALL {
                println!("{:<16} {}", demo.name().bold(), demo.summary());
            }
            return Ok(());
        }
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Chat(_) | Command::Serve(_) => {}
    }

    let settings = Settings::from_env()?;
    match command {
        Command::Chat(demo) => chat(&settings, demo).await,
        Command::Serve(addr) => serve(&settings, addr).await,
        Command::List | Command::Help => Ok(()),
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    let args: Vec<_> = args.collect();
    let command = match args.as_slice() {
        [] => Command::Chat(Demo::Assistant),
        [flag] if flag == "-h" || flag == "--help" => Command::Help,
        [cmd] if cmd == "list" => Command::List,
        [cmd, rest @ ..] if cmd == "serve" => {
            let addr = match rest {
                [] => DEFAULT_ADDR,
                [addr] => addr.as_str(),
                _ => bail!(USAGE),
            };
            let addr = addr
                .parse()
                .with_context(|| format!("invalid address `{addr}`"))?;
            Command::Serve(addr)
        }
        [demo] => Command::Chat(demo.parse()?),
        _ => bail!(USAGE),
    };
    Ok(command)
}

async fn chat(settings: &Settings, demo: Demo) -> anyhow::Result<()> {
    let provider =
        OpenAIProvider::new(settings.openai_config(demo.model_settings()));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let options = DemoOptions {
        weather_api_key: settings.weather_api_key().map(str::to_owned),
        on_problem: Some(Arc::new({
            let event_tx = event_tx.clone();
            move |problem: &Problems| {
                event_tx.send(SessionEvent::Problem(problem.clone())).ok();
            }
        })),
        ..Default::default()
    };
    let session = SessionBuilder::new(demo, provider)
        .with_options(options)
        .on_tool_call({
            let event_tx = event_tx.clone();
            move |req| {
                event_tx.send(SessionEvent::ToolCall(req.name.clone())).ok();
            }
        })
        .on_agent_changed({
            let event_tx = event_tx.clone();
            move |name| {
                event_tx
                    .send(SessionEvent::AgentChanged(name.to_owned()))
                    .ok();
            }
        })
        .build()?;

    println!(
        "{}Chatting with the {} demo, {}. Press Ctrl-D to quit.",
        BAR_CHAR.bright_cyan(),
        demo.bold(),
        demo.summary()
    );

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut stdin = BufReader::new(io::stdin());

    loop {
        print!("User: ");
        std::io::stdout().flush()?;

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");

        let mut reply = pin!(session.send_message(input));
        let result = loop {
            select! {
                result = reply.as_mut() => break result,
                Some(event) = event_rx.recv() => {
                    progress_bar.suspend(|| print_event(event));
                }
                _ = sleep(Duration::from_millis(100)) => progress_bar.tick(),
            }
        };
        progress_bar.finish_and_clear();
        // Callbacks fired right before the reply may still be queued.
        drain_events(&mut event_rx).into_iter().for_each(print_event);

        match result {
            Ok(reply) => {
                let speaker = if reply.is_handed_off() {
                    format!("Ai ({})", reply.agent_name())
                } else {
                    "Ai".to_owned()
                };
                println!(
                    "{}{}: {}",
                    BAR_CHAR.bright_cyan(),
                    speaker.bold(),
                    reply.text().bright_white()
                );
            }
            Err(err) => print_error(&session, &err),
        }
    }

    println!();
    Ok(())
}

fn drain_events(
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Vec<SessionEvent> {
    let mut events = vec![];
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    events
}

fn print_event(event: SessionEvent) {
    let bar = BAR_CHAR.bright_yellow();
    match event {
        SessionEvent::ToolCall(name) => {
            println!("{bar}🔧 Calling {}", name.bright_white());
        }
        SessionEvent::AgentChanged(name) => {
            println!("{bar}🔀 Handed off to {}", name.bright_white());
        }
        SessionEvent::Problem(problem) => {
            println!("{bar}User Question: {}", problem.user_question);
            println!("{bar}Topic: {}", problem.topic);
        }
    }
}

fn print_error(session: &Session, err: &flash_agent::core::RunError) {
    let message = session.describe_error(err);
    if err.is_tripwire() {
        println!(
            "{}{}: {}",
            BAR_CHAR.bright_yellow(),
            "Ai".bold(),
            message.bright_white()
        );
    } else {
        println!("{}{}", BAR_CHAR.bright_red(), message.bright_red());
    }
}

#[cfg(feature = "web")]
async fn serve(settings: &Settings, addr: SocketAddr) -> anyhow::Result<()> {
    let demo = Demo::Triage;
    let provider =
        OpenAIProvider::new(settings.openai_config(demo.model_settings()));
    let session = SessionBuilder::new(demo, provider).build()?;
    println!(
        "{}Chat is live on {}",
        BAR_CHAR.bright_cyan(),
        format!("http://{addr}").bold()
    );
    flash_agent::web::serve(addr, session)
        .await
        .with_context(|| format!("failed to serve on {addr}"))
}

#[cfg(not(feature = "web"))]
async fn serve(_settings: &Settings, _addr: SocketAddr) -> anyhow::Result<()> {
    bail!("flash-agent was built without the `web` feature")
}

async fn read_line(stdin: &mut BufReader<Stdin>) -> Option<String> {
    let mut line = String::new();
    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {err}");
            None
        }
    }
}
