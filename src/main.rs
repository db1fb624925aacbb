use chat_minimalist::app::{ChatApp, Session};
use chat_minimalist::config::Config;
use dotenv::dotenv;
use iced::{window, Application, Settings, Size};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let session = Session::open(&config)?;

    ChatApp::run(Settings {
        window: window::Settings {
            size: Size::new(720.0, 820.0),
            ..window::Settings::default()
        },
        ..Settings::with_flags(session)
    })?;

    Ok(())
}
