use std::path::PathBuf;
use std::sync::Arc;

use iced::{
    alignment::Horizontal,
    theme,
    widget::{button, column, container, image, mouse_area, row, scrollable, text, text_input, Space},
    Alignment, Application, Background, Border, Color, Command, ContentFit, Element, Length, Subscription,
    Theme,
};
use log::{debug, error, info, warn};

use crate::compose::{ComposeController, ComposeError, Focus};
use crate::config::Config;
use crate::emoji::{EmojiPicker, PALETTE};
use crate::identity::Identity;
use crate::models::Content;
use crate::prefs::Preferences;
use crate::projection::{Projection, ScrollRequest, SCROLL_DEBOUNCE};
use crate::render::{format_timestamp, Body, MessageNode, Role};
use crate::storage::{ChangeEvent, EmbeddedStore, LiveQuery, RecordStore};
use crate::theme::ThemeStore;

const NAME_INPUT: &str = "name_input";
const MESSAGE_INPUT: &str = "message_input";
const MESSAGE_SCROLL: &str = "message_scroll";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Everything a handler may touch: the store handle, persisted
/// preferences, the active identity and the projected message list.
pub struct Session {
    pub store: EmbeddedStore,
    pub prefs: Preferences,
    pub identity: Identity,
    pub theme: ThemeStore,
    pub projection: Projection,
    pub composer: ComposeController,
}

impl Session {
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let store = EmbeddedStore::open(&config.db_path)?;
        let prefs = Preferences::open(&config.prefs_path)?;
        info!(
            "Opened message store at {} (preferences at {})",
            config.db_path.display(),
            config.prefs_path.display()
        );
        Ok(Self::new(store, prefs)?)
    }

    pub fn new(store: EmbeddedStore, prefs: Preferences) -> rusqlite::Result<Self> {
        let mut theme = ThemeStore::load(&prefs)?;
        let mode = theme.mode();
        theme.apply(&prefs, mode)?;
        let identity = Identity::load(&prefs)?;
        let composer = ComposeController::new(Arc::new(store.clone()));
        Ok(Session {
            store,
            prefs,
            identity,
            theme,
            projection: Projection::new(),
            composer,
        })
    }
}

pub struct ChatApp {
    session: Session,
    name_input: String,
    message_input: String,
    picker: EmojiPicker,
    alert: Option<String>,
    viewer: Option<image::Handle>,
    name_id: text_input::Id,
    message_id: text_input::Id,
    scroll_id: scrollable::Id,
}

#[derive(Debug, Clone)]
pub enum LiveEvent {
    Subscribed,
    Change(ChangeEvent),
    Closed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum AppMessage {
    NameChanged(String),
    MessageChanged(String),
    Submit,
    MessageSent(Result<String, String>),
    SendImage,
    ImageChosen(Option<PathBuf>),
    ImageLoaded(Result<Content, String>),
    ChangeUser,
    ToggleTheme,
    ToggleEmoji,
    EmojiPicked(String),
    OpenImage(image::Handle),
    ImageClicked,
    CloseImage,
    DismissAlert,
    Live(LiveEvent),
    ScrollDue(ScrollRequest),
}

enum LiveState {
    Connecting(EmbeddedStore),
    Streaming(LiveQuery),
    Finished,
}

impl ChatApp {
    fn focus(&self, target: Focus) -> Command<AppMessage> {
        match target {
            Focus::Name => text_input::focus(self.name_id.clone()),
            Focus::Body => text_input::focus(self.message_id.clone()),
        }
    }

    fn reject(&mut self, err: ComposeError) -> Command<AppMessage> {
        match err {
            ComposeError::Input(input) => {
                debug!("Rejected input: {}", input);
                if input.alerts() {
                    self.alert = Some(input.to_string());
                }
                match input.focus() {
                    Some(target) => self.focus(target),
                    None => Command::none(),
                }
            }
            other => {
                error!("{}", other);
                self.alert = Some(other.to_string());
                Command::none()
            }
        }
    }

    fn send(&mut self, result: Result<crate::models::MessageRecord, ComposeError>) -> Command<AppMessage> {
        match result {
            Ok(record) => {
                self.name_input = record.sender.clone();
                Command::perform(self.session.composer.send(record), |result| {
                    AppMessage::MessageSent(result.map_err(|e| e.to_string()))
                })
            }
            Err(e) => self.reject(e),
        }
    }

    fn message_bubble<'a>(&self, node: &'a MessageNode) -> Element<'a, AppMessage> {
        let own = node.role == Role::Own;
        let body: Element<AppMessage> = match &node.body {
            Body::Text(value) => text(value).size(16).into(),
            Body::Image(picture) => button(image(picture.handle.clone()).width(Length::Fixed(220.0)))
                .on_press(AppMessage::OpenImage(picture.handle.clone()))
                .padding(0)
                .style(theme::Button::Text)
                .into(),
            Body::Placeholder(label) => text(label)
                .size(14)
                .style(Color::from_rgb(0.5, 0.5, 0.5))
                .into(),
        };

        let bubble = container(
            column![
                row![
                    text(&node.sender).size(13),
                    text(format_timestamp(node.timestamp))
                        .size(11)
                        .style(Color::from_rgb(0.5, 0.5, 0.5)),
                ]
                .spacing(8)
                .align_items(Alignment::Center),
                body,
            ]
            .spacing(4),
        )
        .padding(10)
        .max_width(420.0)
        .style(move |theme: &Theme| {
            let palette = theme.extended_palette();
            let pair = if own {
                palette.primary.base
            } else {
                palette.background.weak
            };
            container::Appearance {
                text_color: Some(pair.text),
                background: Some(Background::Color(pair.color)),
                border: Border {
                    color: palette.background.strong.color,
                    width: 1.0,
                    radius: 8.0.into(),
                },
                ..Default::default()
            }
        });

        container(bubble)
            .width(Length::Fill)
            .align_x(if own { Horizontal::Right } else { Horizontal::Left })
            .into()
    }

    fn emoji_palette(&self) -> Element<AppMessage> {
        let picker_theme = self.picker.theme().iced_theme();
        let rows = PALETTE
            .chunks(8)
            .map(|chunk| {
                row(chunk
                    .iter()
                    .map(|emoji| {
                        button(text(*emoji).size(22))
                            .on_press(AppMessage::EmojiPicked(emoji.to_string()))
                            .padding(4)
                            .style(theme::Button::Text)
                            .into()
                    })
                    .collect::<Vec<_>>())
                .spacing(2)
                .into()
            })
            .collect::<Vec<Element<AppMessage>>>();

        container(column(rows).spacing(2))
            .padding(8)
            .style(move |_theme: &Theme| {
                let palette = picker_theme.extended_palette();
                container::Appearance {
                    text_color: Some(palette.background.weak.text),
                    background: Some(Background::Color(palette.background.weak.color)),
                    border: Border {
                        color: palette.background.strong.color,
                        width: 1.0,
                        radius: 8.0.into(),
                    },
                    ..Default::default()
                }
            })
            .into()
    }

    fn image_viewer(&self, handle: &image::Handle) -> Element<AppMessage> {
        let close = button("Close").on_press(AppMessage::CloseImage).padding(10);
        // Only the picture itself swallows clicks; the backdrop around it closes.
        let picture = mouse_area(image(handle.clone()).content_fit(ContentFit::Contain))
            .on_press(AppMessage::ImageClicked);
        let stage = container(picture)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x()
            .center_y();

        mouse_area(
            container(
                column![row![Space::with_width(Length::Fill), close], stage]
                    .spacing(10)
                    .padding(20),
            )
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|_theme: &Theme| container::Appearance {
                background: Some(Background::Color(Color::from_rgba(0.0, 0.0, 0.0, 0.85))),
                ..Default::default()
            }),
        )
        .on_press(AppMessage::CloseImage)
        .into()
    }
}

async fn pick_image() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Send an image")
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_file()
        .await
        .map(|file| file.path().to_path_buf())
}

impl Application for ChatApp {
    type Executor = iced::executor::Default;
    type Message = AppMessage;
    type Theme = Theme;
    type Flags = Session;

    fn new(session: Session) -> (Self, Command<AppMessage>) {
        let name_input = session.identity.current().unwrap_or_default().to_string();
        let focus_target = if session.identity.is_locked() {
            MESSAGE_INPUT
        } else {
            NAME_INPUT
        };
        let picker = EmojiPicker::new(session.theme.mode());
        (
            ChatApp {
                session,
                name_input,
                message_input: String::new(),
                picker,
                alert: None,
                viewer: None,
                name_id: text_input::Id::new(NAME_INPUT),
                message_id: text_input::Id::new(MESSAGE_INPUT),
                scroll_id: scrollable::Id::new(MESSAGE_SCROLL),
            },
            text_input::focus(text_input::Id::new(focus_target)),
        )
    }

    fn title(&self) -> String {
        match self.session.identity.current() {
            Some(name) => format!("Chat - {}", name),
            None => String::from("Chat"),
        }
    }

    fn update(&mut self, message: AppMessage) -> Command<AppMessage> {
        match message {
            AppMessage::NameChanged(name) => {
                self.name_input = name;
                Command::none()
            }
            AppMessage::MessageChanged(body) => {
                self.message_input = body;
                Command::none()
            }
            AppMessage::Submit => {
                self.picker.hide();
                let session = &mut self.session;
                let result = session.composer.prepare_text(
                    &mut session.identity,
                    &session.prefs,
                    &self.name_input,
                    &self.message_input,
                );
                self.send(result)
            }
            AppMessage::MessageSent(Ok(id)) => {
                debug!("Write {} accepted", id);
                self.message_input.clear();
                self.focus(Focus::Body)
            }
            AppMessage::MessageSent(Err(e)) => {
                self.alert = Some(e);
                Command::none()
            }
            AppMessage::SendImage => {
                self.picker.hide();
                Command::perform(pick_image(), AppMessage::ImageChosen)
            }
            AppMessage::ImageChosen(None) => {
                debug!("Image selection cancelled");
                Command::none()
            }
            AppMessage::ImageChosen(Some(path)) => {
                info!("Sending image {}", path.display());
                match ComposeController::check_image(path) {
                    Ok(file) => Command::perform(ComposeController::load_image(file), |result| {
                        AppMessage::ImageLoaded(result.map_err(|e| e.to_string()))
                    }),
                    Err(e) => self.reject(e.into()),
                }
            }
            AppMessage::ImageLoaded(Ok(content)) => {
                let session = &mut self.session;
                let result = session.composer.prepare_image(
                    &mut session.identity,
                    &session.prefs,
                    &self.name_input,
                    content,
                );
                self.send(result)
            }
            AppMessage::ImageLoaded(Err(e)) => {
                error!("Could not load image: {}", e);
                self.alert = Some(e);
                Command::none()
            }
            AppMessage::ChangeUser => {
                if let Err(e) = self.session.identity.clear(&self.session.prefs) {
                    warn!("Could not forget identity: {}", e);
                }
                self.name_input.clear();
                self.picker.hide();
                self.focus(Focus::Name)
            }
            AppMessage::ToggleTheme => {
                match self.session.theme.toggle(&self.session.prefs) {
                    Ok(mode) => {
                        info!("Theme switched to {}", mode);
                        self.picker.set_theme(mode);
                    }
                    Err(e) => warn!("Could not save theme: {}", e),
                }
                Command::none()
            }
            AppMessage::ToggleEmoji => {
                self.picker.toggle();
                Command::none()
            }
            AppMessage::EmojiPicked(emoji) => {
                self.picker.pick(&emoji, &mut self.message_input);
                self.focus(Focus::Body)
            }
            AppMessage::OpenImage(handle) => {
                self.viewer = Some(handle);
                Command::none()
            }
            AppMessage::ImageClicked => Command::none(),
            AppMessage::CloseImage => {
                self.viewer = None;
                Command::none()
            }
            AppMessage::DismissAlert => {
                self.alert = None;
                Command::none()
            }
            AppMessage::Live(LiveEvent::Subscribed) => {
                info!("Live message query started");
                Command::none()
            }
            AppMessage::Live(LiveEvent::Change(event)) => {
                let session = &mut self.session;
                match session.projection.apply(event, session.identity.current()) {
                    Some(request) => Command::perform(tokio::time::sleep(SCROLL_DEBOUNCE), move |_| {
                        AppMessage::ScrollDue(request)
                    }),
                    None => Command::none(),
                }
            }
            AppMessage::Live(LiveEvent::Closed) => {
                warn!("Live message query ended");
                Command::none()
            }
            AppMessage::Live(LiveEvent::Failed(e)) => {
                error!("Could not subscribe to messages: {}", e);
                self.alert = Some(format!("Could not load messages: {}", e));
                Command::none()
            }
            AppMessage::ScrollDue(request) => {
                if self.session.projection.scroll_due(request) {
                    scrollable::snap_to(
                        self.scroll_id.clone(),
                        scrollable::RelativeOffset { x: 0.0, y: 1.0 },
                    )
                } else {
                    Command::none()
                }
            }
        }
    }

    fn view(&self) -> Element<AppMessage> {
        if let Some(handle) = &self.viewer {
            return self.image_viewer(handle);
        }

        let mode = self.session.theme.mode();
        let header = row![
            text("Chat").size(28),
            Space::with_width(Length::Fill),
            button(text(mode.toggle_icon()).size(20))
                .on_press(AppMessage::ToggleTheme)
                .style(theme::Button::Text),
        ]
        .spacing(10)
        .align_items(Alignment::Center);

        let mut layout = column![header].spacing(10).padding(20);

        if let Some(alert) = &self.alert {
            layout = layout.push(
                container(
                    row![
                        text(alert).size(16),
                        Space::with_width(Length::Fill),
                        button("OK").on_press(AppMessage::DismissAlert).padding(5),
                    ]
                    .align_items(Alignment::Center),
                )
                .padding(10)
                .style(|theme: &Theme| {
                    let palette = theme.extended_palette();
                    container::Appearance {
                        text_color: Some(palette.danger.base.text),
                        background: Some(Background::Color(palette.danger.base.color)),
                        border: Border {
                            radius: 6.0.into(),
                            ..Default::default()
                        },
                        ..Default::default()
                    }
                }),
            );
        }

        let message_display = scrollable(
            column(
                self.session
                    .projection
                    .messages()
                    .iter()
                    .map(|node| self.message_bubble(node))
                    .collect::<Vec<_>>(),
            )
            .spacing(8)
            .padding(10)
            .width(Length::Fill),
        )
        .height(Length::Fill)
        .id(self.scroll_id.clone());
        layout = layout.push(message_display);

        if self.picker.is_visible() {
            layout = layout.push(self.emoji_palette());
        }

        let locked = self.session.identity.is_locked();
        let mut name_input = text_input("Your name", &self.name_input)
            .id(self.name_id.clone())
            .padding(10)
            .width(Length::Fixed(160.0));
        if !locked {
            name_input = name_input
                .on_input(AppMessage::NameChanged)
                .on_submit(AppMessage::Submit);
        }
        let mut compose_row = row![name_input].spacing(5).align_items(Alignment::Center);
        if locked {
            compose_row = compose_row.push(button("Change").on_press(AppMessage::ChangeUser).padding(10));
        }
        let compose_row = compose_row
            .push(
                text_input("Message", &self.message_input)
                    .id(self.message_id.clone())
                    .on_input(AppMessage::MessageChanged)
                    .on_submit(AppMessage::Submit)
                    .padding(10)
                    .width(Length::Fill),
            )
            .push(button(text("\u{263A}").size(18)).on_press(AppMessage::ToggleEmoji).padding(10))
            .push(button("Send").on_press(AppMessage::Submit).padding(10));

        let compose_row = compose_row.push(button("Send Image").on_press(AppMessage::SendImage).padding(10));

        container(layout.push(compose_row))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        self.session.theme.iced_theme()
    }

    fn subscription(&self) -> Subscription<AppMessage> {
        struct LiveMessages;

        iced::subscription::unfold(
            std::any::TypeId::of::<LiveMessages>(),
            LiveState::Connecting(self.session.store.clone()),
            |state| async move {
                match state {
                    LiveState::Connecting(store) => match store.map(Projection::query()).await {
                        Ok(query) => (AppMessage::Live(LiveEvent::Subscribed), LiveState::Streaming(query)),
                        Err(e) => (
                            AppMessage::Live(LiveEvent::Failed(e.to_string())),
                            LiveState::Finished,
                        ),
                    },
                    LiveState::Streaming(mut query) => match query.next().await {
                        Some(event) => (AppMessage::Live(LiveEvent::Change(event)), LiveState::Streaming(query)),
                        None => (AppMessage::Live(LiveEvent::Closed), LiveState::Finished),
                    },
                    LiveState::Finished => futures_util::future::pending().await,
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::USERNAME_KEY;
    use crate::models::{MessageRecord, MESSAGE_TYPE};
    use crate::storage::{Action, Query};
    use crate::theme::{ThemeMode, THEME_KEY};
    use serde_json::json;

    fn session() -> Session {
        Session::new(EmbeddedStore::in_memory().unwrap(), Preferences::in_memory().unwrap()).unwrap()
    }

    fn app() -> ChatApp {
        let (app, _) = ChatApp::new(session());
        app
    }

    #[test]
    fn test_sent_message_clears_body() {
        let mut app = app();
        app.message_input = "hola".to_string();
        let _ = app.update(AppMessage::MessageSent(Ok("m1".to_string())));
        assert!(app.message_input.is_empty());
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_failed_write_raises_alert_and_keeps_body() {
        let mut app = app();
        app.message_input = "hola".to_string();
        let _ = app.update(AppMessage::MessageSent(Err("Error sending message.".to_string())));
        assert_eq!(app.alert.as_deref(), Some("Error sending message."));
        assert_eq!(app.message_input, "hola");

        let _ = app.update(AppMessage::DismissAlert);
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_submit_adopts_typed_name() {
        let mut app = app();
        app.name_input = " Ana ".to_string();
        app.message_input = "hola".to_string();
        let _ = app.update(AppMessage::Submit);
        assert_eq!(app.name_input, "Ana");
        assert!(app.session.identity.is_locked());
        assert_eq!(app.session.prefs.get(USERNAME_KEY).unwrap(), Some("Ana".to_string()));
        assert!(app.alert.is_none());
    }

    #[test]
    fn test_rejected_submissions() {
        let mut app = app();
        app.message_input = "hola".to_string();
        let _ = app.update(AppMessage::Submit);
        assert_eq!(app.alert.as_deref(), Some("Enter your name."));

        app.alert = None;
        app.name_input = "Ana".to_string();
        app.message_input = "   ".to_string();
        let _ = app.update(AppMessage::Submit);
        assert!(app.alert.is_none());
        assert!(!app.session.identity.is_locked());
    }

    #[test]
    fn test_image_choice_is_type_checked() {
        let mut app = app();
        let _ = app.update(AppMessage::ImageChosen(None));
        assert!(app.alert.is_none());

        let _ = app.update(AppMessage::ImageChosen(Some(PathBuf::from("notes.txt"))));
        assert_eq!(app.alert.as_deref(), Some("Invalid image file."));
    }

    #[test]
    fn test_image_without_name_is_rejected() {
        let mut app = app();
        let content = Content::image("data:image/gif;base64,R0lG", "dot.gif");
        let _ = app.update(AppMessage::ImageLoaded(Ok(content)));
        assert_eq!(app.alert.as_deref(), Some("Enter your name before uploading an image."));
    }

    #[test]
    fn test_change_user_unlocks_name() {
        let mut app = app();
        app.session.identity.set(&app.session.prefs, "Ana").unwrap();
        app.name_input = "Ana".to_string();
        let _ = app.update(AppMessage::ToggleEmoji);
        assert!(app.picker.is_visible());

        let _ = app.update(AppMessage::ChangeUser);
        assert!(!app.session.identity.is_locked());
        assert!(app.name_input.is_empty());
        assert!(!app.picker.is_visible());
        assert_eq!(app.session.prefs.get(USERNAME_KEY).unwrap(), None);
    }

    #[test]
    fn test_toggle_theme_recolors_picker() {
        let mut app = app();
        let _ = app.update(AppMessage::ToggleTheme);
        assert_eq!(app.session.theme.mode(), ThemeMode::Dark);
        assert_eq!(app.picker.theme(), ThemeMode::Dark);
        assert_eq!(app.session.prefs.get(THEME_KEY).unwrap(), Some("dark".to_string()));
        assert_eq!(app.theme(), Theme::Dark);
    }

    #[test]
    fn test_emoji_pick_appends_to_body() {
        let mut app = app();
        app.message_input = "hi ".to_string();
        let _ = app.update(AppMessage::EmojiPicked("\u{1F600}".to_string()));
        assert_eq!(app.message_input, "hi \u{1F600}");
    }

    #[test]
    fn test_viewer_opens_and_closes() {
        let mut app = app();
        let handle = image::Handle::from_memory(vec![0u8; 4]);
        let _ = app.update(AppMessage::OpenImage(handle));
        assert!(app.viewer.is_some());
        let _ = app.update(AppMessage::ImageClicked);
        assert!(app.viewer.is_some());
        let _ = app.update(AppMessage::CloseImage);
        assert!(app.viewer.is_none());
    }

    #[tokio::test]
    async fn test_live_change_lands_in_message_list() {
        let mut app = app();
        let event = ChangeEvent {
            id: "m1".to_string(),
            value: Some(json!({ "sender": "Bo", "content": { "type": "text", "value": "hi" }, "timestamp": 1 })),
            action: Action::Added,
        };
        let _ = app.update(AppMessage::Live(LiveEvent::Change(event)));
        assert_eq!(app.session.projection.messages().len(), 1);
        assert_eq!(app.session.projection.messages().get("m1").unwrap().role, Role::Other);
    }

    #[test]
    fn test_new_session_persists_default_theme() {
        let session = session();
        assert_eq!(session.theme.mode(), ThemeMode::Light);
        assert_eq!(
            session.prefs.get(crate::theme::THEME_KEY).unwrap(),
            Some("light".to_string())
        );
        assert!(!session.identity.is_locked());
    }

    #[tokio::test]
    async fn test_sent_message_echoes_back_through_projection() {
        let mut session = session();
        let mut live = session.store.map(Query::messages()).await.unwrap();

        let record = session
            .composer
            .prepare_text(&mut session.identity, &session.prefs, "Ana", "hola")
            .unwrap();
        let id = session.composer.send(record).await.unwrap();

        let event = live.next().await.unwrap();
        assert_eq!(event.id, id);
        let scroll = session.projection.apply(event, session.identity.current());
        assert!(scroll.is_some());

        let node = session.projection.messages().get(&id).unwrap();
        assert_eq!(node.role, Role::Own);
        assert!(matches!(node.body, Body::Text(ref t) if t == "hola"));
        let stored = MessageRecord::from_value(session.store.get(&id).await.unwrap().as_ref()).unwrap();
        assert_eq!(stored.kind, MESSAGE_TYPE);
    }
}
