//! Ratatui-based terminal front-end.
//!
//! An interactive form over the prediction API: arrow keys step every field
//! of a customer record, numeric fields can be typed in directly, and each
//! submission is re-classified against an adjustable decision threshold
//! without another server round trip. The last ten outcomes stay on screen.
//!
//! The TUI is a pure API client; it performs no validation of its own and
//! surfaces the server's rejection messages verbatim in the status line.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
    Terminal,
};
use thiserror::Error;

use crate::client::{ApiClient, ClientError};
use crate::schema::{
    Contact, Education, Job, Marital, Month, RawRecord, AGE_MAX, AGE_MIN, BALANCE_LIMIT,
    CAMPAIGN_MAX, CAMPAIGN_MIN,
};
use crate::service::{HealthStatus, PredictionResponse};

const FIELD_AGE: usize = 0;
const FIELD_JOB: usize = 1;
const FIELD_MARITAL: usize = 2;
const FIELD_EDUCATION: usize = 3;
const FIELD_BALANCE: usize = 4;
const FIELD_HOUSING: usize = 5;
const FIELD_LOAN: usize = 6;
const FIELD_CONTACT: usize = 7;
const FIELD_MONTH: usize = 8;
const FIELD_CAMPAIGN: usize = 9;
const FIELD_THRESHOLD: usize = 10;
const FIELD_COUNT: usize = 11;

/// The threshold moves in 0.05 notches between 0.05 and 0.95.
const THRESHOLD_STEP: f64 = 0.05;
const MIN_THRESHOLD_STEPS: u8 = 1;
const MAX_THRESHOLD_STEPS: u8 = 19;
const DEFAULT_THRESHOLD_STEPS: u8 = 10;

/// How many past outcomes the session keeps.
const HISTORY_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum TuiError {
    #[error("terminal failure: {0}")]
    Terminal(#[from] io::Error),
}

/// Start the TUI against an already-configured API client.
pub fn run(client: ApiClient) -> Result<(), TuiError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// The editable record plus the client-side decision threshold.
///
/// Numeric fields deliberately use the wide wire types: typed-in values are
/// submitted as-is so the server's validation story is visible end to end,
/// while arrow stepping stays inside the documented ranges.
#[derive(Debug, Clone, PartialEq)]
struct FormState {
    age: i64,
    job: Job,
    marital: Marital,
    education: Education,
    balance: f64,
    housing: bool,
    loan: bool,
    contact: Contact,
    month: Month,
    campaign: i64,
    threshold_steps: u8,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            age: 30,
            job: Job::Technician,
            marital: Marital::Single,
            education: Education::Tertiary,
            balance: 1000.0,
            housing: true,
            loan: false,
            contact: Contact::Cellular,
            month: Month::May,
            campaign: 1,
            threshold_steps: DEFAULT_THRESHOLD_STEPS,
        }
    }
}

impl FormState {
    fn threshold(&self) -> f64 {
        f64::from(self.threshold_steps) * THRESHOLD_STEP
    }

    fn to_raw_record(&self) -> RawRecord {
        RawRecord {
            age: self.age,
            job: self.job.to_string(),
            marital: self.marital.to_string(),
            education: self.education.to_string(),
            balance: self.balance,
            housing: self.housing,
            loan: self.loan,
            contact: self.contact.to_string(),
            month: self.month.to_string(),
            campaign: self.campaign,
        }
    }

    /// Full input echo, one line, in field declaration order.
    fn summary(&self) -> String {
        format!(
            "age {}, {}, {}, {}, balance {:.2}, housing {}, loan {}, {}, {}, campaign {}",
            self.age,
            self.job,
            self.marital,
            self.education,
            self.balance,
            yes_no(self.housing),
            yes_no(self.loan),
            self.contact,
            self.month,
            self.campaign
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// One scored submission, kept for the result panel and the history list.
#[derive(Debug, Clone)]
struct HistoryEntry {
    at: DateTime<Local>,
    summary: String,
    decision: u8,
    proba: Option<f64>,
    threshold: f64,
}

/// Applies the client-side threshold to a server response.
///
/// Without a probability the server's own fixed-cutoff class is shown
/// unchanged, even when the local threshold would disagree with it.
fn decide(response: &PredictionResponse, threshold: f64) -> (u8, Option<f64>) {
    match response.proba_yes {
        Some(p) => (u8::from(p >= threshold), Some(p)),
        None => (response.prediction, None),
    }
}

fn verdict(decision: u8) -> &'static str {
    if decision == 1 { "YES" } else { "NO" }
}

fn cycle<T: Copy + PartialEq>(all: &[T], current: T, delta: i32) -> T {
    let len = all.len() as i32;
    let position = all.iter().position(|v| *v == current).unwrap_or(0) as i32;
    all[(position + delta).rem_euclid(len) as usize]
}

struct App {
    client: ApiClient,
    form: FormState,
    selected_field: usize,
    editing: bool,
    edit_input: String,
    status: String,
    health: Option<HealthStatus>,
    last: Option<HistoryEntry>,
    history: Vec<HistoryEntry>,
}

impl App {
    fn new(client: ApiClient) -> Self {
        let mut app = Self {
            client,
            form: FormState::default(),
            selected_field: 0,
            editing: false,
            edit_input: String::new(),
            status: String::new(),
            health: None,
            last: None,
            history: Vec::new(),
        };
        app.refresh_health();
        app
    }

    fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> Result<(), TuiError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))? {
                continue;
            }

            match event::read()? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        if self.editing {
            self.handle_edit_key(code);
            return false;
        }

        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Up => {
                if self.selected_field > 0 {
                    self.selected_field -= 1;
                }
            }
            KeyCode::Down => {
                if self.selected_field < FIELD_COUNT - 1 {
                    self.selected_field += 1;
                }
            }
            KeyCode::Left => self.adjust_field(-1),
            KeyCode::Right => self.adjust_field(1),
            KeyCode::Enter => {
                if matches!(
                    self.selected_field,
                    FIELD_AGE | FIELD_BALANCE | FIELD_CAMPAIGN
                ) {
                    self.editing = true;
                    self.edit_input.clear();
                    self.status =
                        "Type a new value. Enter applies, Esc cancels.".to_string();
                } else {
                    self.submit();
                }
            }
            KeyCode::Char('p') => self.submit(),
            KeyCode::Char('h') => self.refresh_health(),
            _ => {}
        }

        false
    }

    fn handle_edit_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.editing = false;
                self.edit_input.clear();
                self.status = "Edit canceled.".to_string();
            }
            KeyCode::Enter => self.apply_edit(),
            KeyCode::Backspace => {
                self.edit_input.pop();
            }
            KeyCode::Char(c) => {
                if c.is_ascii_digit() || c == '-' || c == '.' {
                    self.edit_input.push(c);
                }
            }
            _ => {}
        }
    }

    fn apply_edit(&mut self) {
        let input = self.edit_input.trim().to_string();
        let parsed = match self.selected_field {
            FIELD_AGE => input.parse::<i64>().map(|v| self.form.age = v).is_ok(),
            FIELD_BALANCE => input.parse::<f64>().map(|v| self.form.balance = v).is_ok(),
            FIELD_CAMPAIGN => input.parse::<i64>().map(|v| self.form.campaign = v).is_ok(),
            _ => false,
        };
        if parsed {
            self.editing = false;
            self.edit_input.clear();
            self.status = "Value applied; ranges are checked by the server on submit.".to_string();
        } else {
            self.status = format!("'{input}' is not a number.");
        }
    }

    fn adjust_field(&mut self, delta: i32) {
        match self.selected_field {
            FIELD_AGE => {
                self.form.age = (self.form.age + i64::from(delta))
                    .clamp(i64::from(AGE_MIN), i64::from(AGE_MAX));
            }
            FIELD_JOB => self.form.job = cycle(&Job::ALL, self.form.job, delta),
            FIELD_MARITAL => self.form.marital = cycle(&Marital::ALL, self.form.marital, delta),
            FIELD_EDUCATION => {
                self.form.education = cycle(&Education::ALL, self.form.education, delta);
            }
            FIELD_BALANCE => {
                self.form.balance = (self.form.balance + 100.0 * f64::from(delta))
                    .clamp(-BALANCE_LIMIT, BALANCE_LIMIT);
            }
            FIELD_HOUSING => self.form.housing = !self.form.housing,
            FIELD_LOAN => self.form.loan = !self.form.loan,
            FIELD_CONTACT => self.form.contact = cycle(&Contact::ALL, self.form.contact, delta),
            FIELD_MONTH => self.form.month = cycle(&Month::ALL, self.form.month, delta),
            FIELD_CAMPAIGN => {
                self.form.campaign = (self.form.campaign + i64::from(delta))
                    .clamp(i64::from(CAMPAIGN_MIN), i64::from(CAMPAIGN_MAX));
            }
            FIELD_THRESHOLD => {
                let next = i32::from(self.form.threshold_steps) + delta;
                self.form.threshold_steps = next.clamp(
                    i32::from(MIN_THRESHOLD_STEPS),
                    i32::from(MAX_THRESHOLD_STEPS),
                ) as u8;
            }
            _ => {}
        }
    }

    fn refresh_health(&mut self) {
        match self.client.health() {
            Ok(health) => {
                self.status = if health.model_loaded {
                    "Server healthy, model loaded.".to_string()
                } else {
                    "Server healthy but running without a model.".to_string()
                };
                self.health = Some(health);
            }
            Err(err) => {
                self.health = None;
                self.status = format!("Server unreachable: {err}");
            }
        }
    }

    fn submit(&mut self) {
        let record = self.form.to_raw_record();
        match self.client.predict(&record) {
            Ok(response) => {
                let threshold = self.form.threshold();
                let (decision, proba) = decide(&response, threshold);
                let entry = HistoryEntry {
                    at: Local::now(),
                    summary: self.form.summary(),
                    decision,
                    proba,
                    threshold,
                };
                self.status = match proba {
                    Some(p) => format!(
                        "p(yes) = {p:.4} -> {} at threshold {threshold:.2}",
                        verdict(decision)
                    ),
                    None => format!(
                        "No probability returned; showing the server's class {}.",
                        verdict(decision)
                    ),
                };
                self.record_outcome(entry);
            }
            Err(err @ ClientError::Rejected { .. }) => {
                self.status = format!("Rejected: {err}");
            }
            Err(err) => {
                self.status = format!("Prediction failed: {err}");
            }
        }
    }

    fn record_outcome(&mut self, entry: HistoryEntry) {
        self.last = Some(entry.clone());
        self.history.insert(0, entry);
        self.history.truncate(HISTORY_LIMIT);
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("depomark", Style::default().fg(Color::Cyan)),
            Span::raw(" - term deposit prediction console"),
        ]));

        let server = match &self.health {
            Some(health) if health.model_loaded => {
                Span::styled("model loaded", Style::default().fg(Color::Green))
            }
            Some(_) => Span::styled("degraded (no model)", Style::default().fg(Color::Yellow)),
            None => Span::styled("unreachable", Style::default().fg(Color::Red)),
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("server: {} | ", self.client.base_url()),
                Style::default().fg(Color::Gray),
            ),
            server,
        ]));

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);

        self.draw_form(frame, columns[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(8), Constraint::Min(0)])
            .split(columns[1]);
        self.draw_result(frame, right[0]);
        self.draw_history(frame, right[1]);
    }

    fn draw_form(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items = vec![
            ListItem::new(format!("Age:       {}", self.form.age)),
            ListItem::new(format!("Job:       {}", self.form.job)),
            ListItem::new(format!("Marital:   {}", self.form.marital)),
            ListItem::new(format!("Education: {}", self.form.education)),
            ListItem::new(format!("Balance:   {:.2}", self.form.balance)),
            ListItem::new(format!("Housing:   {}", yes_no(self.form.housing))),
            ListItem::new(format!("Loan:      {}", yes_no(self.form.loan))),
            ListItem::new(format!("Contact:   {}", self.form.contact)),
            ListItem::new(format!("Month:     {}", self.form.month)),
            ListItem::new(format!("Campaign:  {}", self.form.campaign)),
            ListItem::new(format!("Threshold: {:.2}", self.form.threshold())),
        ];

        let list = List::new(items)
            .block(Block::default().title("Customer record").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected_field));
        frame.render_stateful_widget(list, area, &mut state);

        if self.editing {
            let hint = Paragraph::new(format!("New value: {}_", self.edit_input)).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
            let rect = Rect {
                x: area.x + 2,
                y: area.y + area.height.saturating_sub(2),
                width: area.width.saturating_sub(4),
                height: 1,
            };
            frame.render_widget(hint, rect);
        }
    }

    fn draw_result(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default().title("Latest decision").borders(Borders::ALL);

        let Some(last) = &self.last else {
            let empty = Paragraph::new("No prediction yet. Press p to score the record.")
                .style(Style::default().fg(Color::Yellow))
                .block(block);
            frame.render_widget(empty, area);
            return;
        };

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(3), Constraint::Min(0)])
            .split(inner);

        let (color, label) = if last.decision == 1 {
            (Color::Green, "YES - likely to subscribe")
        } else {
            (Color::Red, "NO - unlikely to subscribe")
        };
        let headline = Paragraph::new(Text::from(vec![
            Line::from(Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("threshold {:.2} | {}", last.threshold, last.summary),
                Style::default().fg(Color::Gray),
            )),
        ]));
        frame.render_widget(headline, rows[0]);

        match last.proba {
            Some(p) => {
                let gauge = Gauge::default()
                    .block(Block::default().title("p(yes)").borders(Borders::ALL))
                    .gauge_style(Style::default().fg(color))
                    .ratio(p.clamp(0.0, 1.0))
                    .label(format!("{p:.4}"));
                frame.render_widget(gauge, rows[1]);
            }
            None => {
                let note = Paragraph::new("probability unavailable; server class shown")
                    .style(Style::default().fg(Color::Yellow));
                frame.render_widget(note, rows[1]);
            }
        }
    }

    fn draw_history(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .history
            .iter()
            .map(|entry| {
                let proba = entry
                    .proba
                    .map(|p| format!("{p:.4}"))
                    .unwrap_or_else(|| "-".to_string());
                ListItem::new(format!(
                    "{}  {:<3} p={} @{:.2}  {}",
                    entry.at.format("%H:%M:%S"),
                    verdict(entry.decision),
                    proba,
                    entry.threshold,
                    entry.summary,
                ))
            })
            .collect();

        let list = List::new(items).block(
            Block::default()
                .title(format!("History (last {HISTORY_LIMIT})"))
                .borders(Borders::ALL),
        );
        frame.render_widget(list, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  ←/→ adjust  Enter edit/submit  p predict  h health  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}
