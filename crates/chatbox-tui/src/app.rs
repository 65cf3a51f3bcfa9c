use chatbox_core::{ApiClient, ApiError, ChatSync, Job, Outcome};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::{AccountEvent, AppEvent};

pub const SESSION_EXPIRED_NOTICE: &str = "Session expired, please log in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    Login,
    Register,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    /// Takes the value out, leaving the field empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }
}

#[derive(Debug, Clone)]
pub struct LoginForm {
    pub email: TextInput,
    pub password: TextInput,
    pub field: LoginField,
    pub mode: AccountMode,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub busy: bool,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            email: TextInput::default(),
            password: TextInput::default(),
            field: LoginField::Email,
            mode: AccountMode::Login,
            error: None,
            notice: None,
            busy: false,
        }
    }
}

impl LoginForm {
    pub fn current_field(&mut self) -> &mut TextInput {
        match self.field {
            LoginField::Email => &mut self.email,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn toggle_field(&mut self) {
        self.field = match self.field {
            LoginField::Email => LoginField::Password,
            LoginField::Password => LoginField::Email,
        };
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AccountMode::Login => AccountMode::Register,
            AccountMode::Register => AccountMode::Login,
        };
        self.error = None;
        self.notice = None;
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Login / registration form
    pub login: LoginForm,

    // Chat state
    pub chat: ChatSync,
    pub session_state: ListState,
    pub input: TextInput,
    pub status: Option<String>,

    // Thread scrolling
    pub thread_scroll: u16,
    pub thread_height: u16, // Height of thread area for scroll calculations
    pub thread_width: u16,  // Width of thread area for wrap calculations
    pub follow_bottom: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub sessions_area: Option<Rect>,
    pub thread_area: Option<Rect>,

    /// Bumped whenever the signed-in state is torn down; jobs carry the value
    /// they were spawned under
    generation: u64,
    tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(api: ApiClient, tx: UnboundedSender<AppEvent>) -> Self {
        let screen = if api.auth().is_authenticated() {
            Screen::Chat
        } else {
            Screen::Login
        };

        Self {
            should_quit: false,
            screen,
            input_mode: InputMode::Normal,

            login: LoginForm::default(),

            chat: ChatSync::new(api),
            session_state: ListState::default(),
            input: TextInput::default(),
            status: None,

            thread_scroll: 0,
            thread_height: 0,
            thread_width: 0,
            follow_bottom: true,

            animation_frame: 0,

            sessions_area: None,
            thread_area: None,

            generation: 0,
            tx,
        }
    }

    /// Kicks off the initial session load when already signed in
    pub fn start(&mut self) {
        if self.screen == Screen::Chat {
            self.reload_sessions();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Background work
    // ─────────────────────────────────────────────────────────────────────

    fn spawn_job(&self, job: Job) {
        let api = self.chat.api().clone();
        let tx = self.tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let outcome = job.run(&api).await;
            let _ = tx.send(AppEvent::Api(generation, outcome));
        });
    }

    pub fn apply_outcome(&mut self, generation: u64, outcome: Outcome) {
        // Late results from before a logout or expiry
        if generation != self.generation || self.screen != Screen::Chat {
            tracing::debug!(generation, current = self.generation, "Discarding stale outcome");
            return;
        }
        let applied = self.chat.apply(outcome);
        if let Some(job) = applied.next {
            self.spawn_job(job);
        }
        if let Some(e) = applied.error {
            self.report_error(e);
        }
        self.sync_selection();
        if self.follow_bottom {
            self.scroll_thread_to_bottom();
        }
    }

    fn report_error(&mut self, e: ApiError) {
        if e.is_session_expired() {
            self.expire_session();
        } else {
            tracing::warn!(error = %e, "Request failed");
            self.status = Some(e.user_message());
        }
    }

    /// Drops chat state and returns to the login view
    pub fn expire_session(&mut self) {
        let auth = self.chat.api().auth();
        auth.clear();
        auth.set_active_session_id(None);
        self.leave_chat();
        self.login.error = Some(SESSION_EXPIRED_NOTICE.to_string());
    }

    fn leave_chat(&mut self) {
        self.generation += 1;
        self.chat.reset();
        self.session_state.select(None);
        self.input.clear();
        self.input_mode = InputMode::Normal;
        self.status = None;
        self.thread_scroll = 0;
        self.screen = Screen::Login;
        self.login.field = LoginField::Email;
        self.login.password.clear();
        self.login.busy = false;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Account actions
    // ─────────────────────────────────────────────────────────────────────

    pub fn submit_login(&mut self) {
        if self.login.busy {
            return;
        }
        let email = self.login.email.value.trim().to_string();
        let password = self.login.password.value.clone();
        if email.is_empty() || password.is_empty() {
            self.login.error = Some("Email and password are required.".to_string());
            return;
        }

        self.login.error = None;
        self.login.notice = None;
        self.login.busy = true;

        let api = self.chat.api().clone();
        let tx = self.tx.clone();
        let mode = self.login.mode;
        tokio::spawn(async move {
            let event = match mode {
                AccountMode::Login => {
                    AccountEvent::LoggedIn(api.login(&email, &password).await.map(|_| ()))
                }
                AccountMode::Register => {
                    AccountEvent::Registered(api.register(&email, &password).await)
                }
            };
            let _ = tx.send(AppEvent::Account(event));
        });
    }

    pub fn apply_account(&mut self, event: AccountEvent) {
        self.login.busy = false;
        match event {
            AccountEvent::LoggedIn(Ok(())) => {
                self.login.password.clear();
                self.login.error = None;
                self.login.notice = None;
                self.screen = Screen::Chat;
                self.reload_sessions();
            }
            AccountEvent::Registered(Ok(())) => {
                self.login.mode = AccountMode::Login;
                self.login.password.clear();
                self.login.field = LoginField::Password;
                self.login.error = None;
                self.login.notice = Some("Account created, please log in.".to_string());
            }
            AccountEvent::LoggedIn(Err(e)) | AccountEvent::Registered(Err(e)) => {
                tracing::warn!(error = %e, "Account request failed");
                self.login.error = Some(match e {
                    ApiError::Unauthorized => "Invalid email or password.".to_string(),
                    e => e.user_message(),
                });
            }
        }
    }

    pub fn logout(&mut self) {
        self.chat.api().logout();
        self.leave_chat();
        self.login.notice = Some("Logged out.".to_string());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session actions
    // ─────────────────────────────────────────────────────────────────────

    pub fn reload_sessions(&mut self) {
        let job = self.chat.begin_load();
        self.spawn_job(job);
    }

    pub fn new_session(&mut self) {
        self.status = None;
        let job = self.chat.begin_create();
        self.spawn_job(job);
    }

    pub fn selected_session_id(&self) -> Option<String> {
        self.session_state
            .selected()
            .and_then(|i| self.chat.sessions().sessions().get(i))
            .map(|s| s.id.clone())
    }

    pub fn open_selected_session(&mut self) {
        let Some(id) = self.selected_session_id() else {
            return;
        };
        if self.chat.sessions().is_active(&id) {
            return;
        }
        self.status = None;
        if let Some(job) = self.chat.begin_switch(&id) {
            self.thread_scroll = 0;
            self.follow_bottom = true;
            self.spawn_job(job);
        }
    }

    pub fn delete_selected_session(&mut self) {
        let Some(id) = self.selected_session_id() else {
            return;
        };
        if let Some(job) = self.chat.begin_delete(&id) {
            self.status = None;
            self.spawn_job(job);
        }
    }

    pub fn session_nav_down(&mut self) {
        let len = self.chat.sessions().len();
        if len > 0 {
            let i = self.session_state.selected().unwrap_or(0);
            self.session_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn session_nav_up(&mut self) {
        let i = self.session_state.selected().unwrap_or(0);
        self.session_state.select(Some(i.saturating_sub(1)));
    }

    /// Keeps the sidebar selection on a valid row, preferring the active session
    pub fn sync_selection(&mut self) {
        let sessions = self.chat.sessions();
        if sessions.is_empty() {
            self.session_state.select(None);
            return;
        }
        let in_range = self.session_state.selected().is_some_and(|i| i < sessions.len());
        if !in_range {
            let index = sessions
                .active_id()
                .and_then(|id| sessions.position(id))
                .unwrap_or(0);
            self.session_state.select(Some(index));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    pub fn send_input(&mut self) {
        if self.input.value.trim().is_empty() {
            self.status = Some("Type a message first.".to_string());
            return;
        }
        if self.chat.active_id().is_none() {
            self.status = Some("No active session. Press n to start one.".to_string());
            return;
        }

        let text = self.input.take();
        if let Some(job) = self.chat.begin_send(&text) {
            self.status = None;
            self.follow_bottom = true;
            self.scroll_thread_to_bottom();
            self.spawn_job(job);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.messages().is_waiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_thread_down(&mut self, lines: u16) {
        self.thread_scroll = self.thread_scroll.saturating_add(lines);
        let max = self.thread_max_scroll();
        if self.thread_scroll >= max {
            self.thread_scroll = max;
            self.follow_bottom = true;
        }
    }

    pub fn scroll_thread_up(&mut self, lines: u16) {
        self.thread_scroll = self.thread_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    /// Scroll the thread so the newest message (or typing indicator) is visible
    pub fn scroll_thread_to_bottom(&mut self) {
        self.thread_scroll = self.thread_max_scroll();
    }

    fn thread_max_scroll(&self) -> u16 {
        // Use actual thread width for wrap calculation, default to 50 if not set
        let wrap_width = if self.thread_width > 0 {
            self.thread_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.chat.messages().messages() {
            total_lines = total_lines.saturating_add(1); // Sender line ("You:" or "Bot:")
            let text = if msg.is_typing() { "typing..." } else { msg.text.as_str() };
            for line in text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(((char_count / wrap_width) + 1) as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        let visible_height = if self.thread_height > 0 {
            self.thread_height
        } else {
            20
        };

        total_lines.saturating_sub(visible_height)
    }
}
