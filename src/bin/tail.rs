use std::env;
use std::sync::Arc;

use anyhow::Result;
use chat_minimalist::compose::{ComposeController, ComposeError};
use chat_minimalist::config::Config;
use chat_minimalist::identity::Identity;
use chat_minimalist::prefs::Preferences;
use chat_minimalist::projection::Projection;
use chat_minimalist::render::{format_timestamp, Body, MessageNode};
use chat_minimalist::storage::{Action, EmbeddedStore, RecordStore};
use dotenv::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};

fn describe(node: &MessageNode) -> String {
    let body = match &node.body {
        Body::Text(text) => text.clone(),
        Body::Image(image) => format!("[image: {}]", image.alt),
        Body::Placeholder(label) => label.clone(),
    };
    format!("[{}] {}: {}", format_timestamp(node.timestamp), node.sender, body)
}

async fn run_tail(store: EmbeddedStore, prefs: Preferences, name: Option<String>) -> Result<()> {
    let mut identity = Identity::load(&prefs)?;
    if let Some(name) = name.as_deref() {
        identity.set(&prefs, name)?;
    }
    let me = identity.current().map(String::from);
    match &me {
        Some(name) => println!("Chatting as {} (/quit to exit, /clear to wipe history)", name),
        None => println!("Read-only: pass a name to send messages"),
    }

    let mut live = store.map(Projection::query()).await?;
    tokio::spawn(async move {
        let mut projection = Projection::new();
        while let Some(event) = live.next().await {
            let id = event.id.clone();
            let action = event.action.clone();
            projection.apply(event, me.as_deref());
            match action {
                Action::Initial | Action::Added => {
                    if let Some(node) = projection.messages().get(&id) {
                        println!("{}", describe(node));
                    }
                }
                Action::Updated => {
                    if let Some(node) = projection.messages().get(&id) {
                        println!("(edited) {}", describe(node));
                    }
                }
                Action::Removed => println!("(message {} removed)", id),
                Action::Other(_) => {}
            }
        }
        println!("Message feed closed");
    });

    let composer = ComposeController::new(Arc::new(store.clone()));
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();

    loop {
        input.clear();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }
        let line = input.trim();

        if line.eq_ignore_ascii_case("/quit") {
            println!("Exiting...");
            break;
        }
        if line.eq_ignore_ascii_case("/clear") {
            let removed = store.clear().await?;
            println!("Cleared {} records", removed);
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let name = identity.current().unwrap_or_default().to_string();
        let sent = match composer.prepare_text(&mut identity, &prefs, &name, line) {
            Ok(record) => composer.send(record).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(_) => {}
            Err(ComposeError::Input(e)) => println!("{}", e),
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let store = EmbeddedStore::open(&config.db_path)?;
    let prefs = Preferences::open(&config.prefs_path)?;
    let name = env::args().nth(1);

    run_tail(store, prefs, name).await
}
