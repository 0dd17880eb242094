// settings dialog. every leaf of the settings document is mirrored
// into a form control picked by its json type, and edits go to a draft
// copy until the user applies them.

use crate::{config, settings, ui};
use iced::widget::{
    button, checkbox, column, container, horizontal_space, pick_list, row, scrollable, text,
    text_input, Column,
};
use iced::{Element, Length, Task};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

const UPDATE_FREQUENCIES: &[&str] = &["daily", "weekly", "manual"];
const DARK_MODES: &[&str] = &["auto", "light", "dark"];
const LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error"];

fn choices(key: &str) -> Option<&'static [&'static str]> {
    match key {
        "update_frequency" => Some(UPDATE_FREQUENCIES),
        "dark_mode" => Some(DARK_MODES),
        "log_level" => Some(LOG_LEVELS),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    SelectTab(String),
    Toggle(String, String, bool),
    Text(String, String, String),
    Number(String, String, String),
    Choice(String, String, &'static str),
    PendingItem(String, String, String),
    AddItem(String, String),
    RemoveItem(String, String, usize),
    Browse(String, String),
    Browsed(String, String, Option<PathBuf>),
    Reset,
    Cancel,
    Apply,
    Ok,
}

// what the application has to do after the dialog handled a message
pub enum Action {
    None,
    Run(Task<Message>),
    Save { settings: Map<String, Value>, close: bool },
    Close,
}

#[derive(Debug, Clone)]
pub struct SettingsEditor {
    draft: Map<String, Value>,
    tab: String,
    // text typed into numeric and list inputs that has not been committed yet
    pending: HashMap<(String, String), String>,
}

fn parse_number(txt: &str, previous: Option<&Value>) -> Option<Value> {
    let txt = txt.trim();
    if let Ok(n) = txt.parse::<u64>() {
        return Some(Value::from(n));
    }
    // only categories that already hold fractional values accept them
    match previous {
        Some(Value::Number(n)) if n.is_f64() => txt
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

impl SettingsEditor {
    pub fn new(settings: &Map<String, Value>) -> Self {
        let tab = settings
            .iter()
            .find(|(_, v)| v.is_object())
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| config::CATEGORIES[0].to_string());
        Self {
            draft: settings.clone(),
            tab,
            pending: HashMap::new(),
        }
    }

    pub fn draft(&self) -> &Map<String, Value> {
        &self.draft
    }

    fn value(&self, category: &str, key: &str) -> Option<&Value> {
        self.draft.get(category).and_then(|c| c.get(key))
    }

    fn set(&mut self, category: &str, key: &str, value: Value) {
        if let Some(Value::Object(c)) = self.draft.get_mut(category) {
            c.insert(key.to_string(), value);
        }
    }

    fn list_mut(&mut self, category: &str, key: &str) -> Option<&mut Vec<Value>> {
        self.draft
            .get_mut(category)
            .and_then(|c| c.get_mut(key))
            .and_then(Value::as_array_mut)
    }

    pub fn update(&mut self, message: Message) -> Action {
        match message {
            Message::SelectTab(tab) => self.tab = tab,
            Message::Toggle(c, k, b) => self.set(&c, &k, Value::Bool(b)),
            Message::Text(c, k, t) => self.set(&c, &k, Value::String(t)),
            Message::Choice(c, k, t) => self.set(&c, &k, Value::String(t.to_string())),
            Message::Number(c, k, t) => {
                if let Some(n) = parse_number(&t, self.value(&c, &k)) {
                    self.set(&c, &k, n);
                }
                self.pending.insert((c, k), t);
            }
            Message::PendingItem(c, k, t) => {
                self.pending.insert((c, k), t);
            }
            Message::AddItem(c, k) => {
                let item = self
                    .pending
                    .remove(&(c.clone(), k.clone()))
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default();
                let item = if c == "exclusions" && k == "extensions" {
                    settings::normalize_extension(&item)
                } else {
                    item
                };
                if !item.is_empty() {
                    if let Some(list) = self.list_mut(&c, &k) {
                        if !list.iter().any(|v| v.as_str() == Some(&item)) {
                            list.push(Value::String(item));
                        }
                    }
                }
            }
            Message::RemoveItem(c, k, i) => {
                if let Some(list) = self.list_mut(&c, &k) {
                    if i < list.len() {
                        list.remove(i);
                    }
                }
            }
            Message::Browse(c, k) => {
                let dialog = rfd::AsyncFileDialog::new().set_title(ui::setting_label(&k));
                let dialog = match self.value(&c, &k).and_then(Value::as_str) {
                    Some(current) if !current.is_empty() => dialog.set_directory(current),
                    _ => dialog,
                };
                return Action::Run(Task::perform(
                    async move { dialog.pick_folder().await.map(|h| h.path().to_path_buf()) },
                    move |path| Message::Browsed(c.clone(), k.clone(), path),
                ));
            }
            Message::Browsed(c, k, path) => {
                if let Some(path) = path {
                    self.set(&c, &k, Value::String(path.to_string_lossy().into_owned()));
                }
            }
            Message::Reset => {
                self.draft = config::defaults();
                self.pending.clear();
            }
            Message::Cancel => return Action::Close,
            Message::Apply => {
                self.pending.retain(|(c, k), _| {
                    self.draft
                        .get(c)
                        .and_then(|v| v.get(k))
                        .map(Value::is_array)
                        .unwrap_or(false)
                });
                return Action::Save {
                    settings: self.draft.clone(),
                    close: false,
                };
            }
            Message::Ok => {
                return Action::Save {
                    settings: self.draft.clone(),
                    close: true,
                }
            }
        }
        Action::None
    }

    fn field<'a>(&'a self, category: &'a str, key: &'a str, value: &'a Value) -> Element<'a, Message> {
        let label = ui::setting_label(key);
        let c = category.to_string();
        let k = key.to_string();
        let pending = self.pending.get(&(c.clone(), k.clone()));

        let control: Element<'a, Message> = match value {
            Value::Bool(b) => {
                return checkbox(label, *b)
                    .on_toggle(move |b| Message::Toggle(c.clone(), k.clone(), b))
                    .size(16)
                    .into()
            }
            Value::Number(n) => {
                let shown = pending.cloned().unwrap_or_else(|| n.to_string());
                text_input("", &shown)
                    .on_input(move |t| Message::Number(c.clone(), k.clone(), t))
                    .width(120)
                    .into()
            }
            Value::String(s) => {
                if let Some(options) = choices(key) {
                    let selected = options.iter().copied().find(|o| o == s);
                    pick_list(options, selected, move |t| {
                        Message::Choice(c.clone(), k.clone(), t)
                    })
                    .into()
                } else if key == "quarantine_path" {
                    let (c2, k2) = (c.clone(), k.clone());
                    row![
                        text_input("", s)
                            .on_input(move |t| Message::Text(c.clone(), k.clone(), t)),
                        button("Browse").on_press(Message::Browse(c2, k2)),
                    ]
                    .spacing(ui::SPACING)
                    .into()
                } else {
                    text_input("", s)
                        .on_input(move |t| Message::Text(c.clone(), k.clone(), t))
                        .into()
                }
            }
            Value::Array(items) => return self.list_field(label, c, k, items, pending),
            other => text(other.to_string()).into(),
        };

        row![
            text(label).width(Length::FillPortion(2)),
            container(control).width(Length::FillPortion(3)),
        ]
        .spacing(ui::SPACING)
        .align_y(iced::alignment::Vertical::Center)
        .into()
    }

    fn list_field<'a>(
        &'a self,
        label: String,
        c: String,
        k: String,
        items: &'a [Value],
        pending: Option<&'a String>,
    ) -> Element<'a, Message> {
        let mut list = Column::new().spacing(4);
        for (i, item) in items.iter().enumerate() {
            let shown = item
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| item.to_string());
            list = list.push(
                row![
                    text(shown),
                    horizontal_space(),
                    button("Remove").on_press(Message::RemoveItem(c.clone(), k.clone(), i)),
                ]
                .align_y(iced::alignment::Vertical::Center),
            );
        }
        if items.is_empty() {
            list = list.push(text("(none)"));
        }

        let input = pending.map(String::as_str).unwrap_or("");
        let (c2, k2) = (c.clone(), k.clone());
        let add = row![
            text_input("Add...", input)
                .on_input(move |t| Message::PendingItem(c.clone(), k.clone(), t))
                .on_submit(Message::AddItem(c2.clone(), k2.clone())),
            button("Add").on_press(Message::AddItem(c2, k2)),
        ]
        .spacing(ui::SPACING);

        column![text(label), list, add].spacing(4).into()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let tabs = self
            .draft
            .iter()
            .filter(|(_, v)| v.is_object())
            .fold(row![].spacing(4), |tabs, (category, _)| {
                let style = if *category == self.tab {
                    button::primary
                } else {
                    button::secondary
                };
                tabs.push(
                    button(text(ui::category_title(category)).size(ui::TEXT_SIZE))
                        .style(style)
                        .on_press(Message::SelectTab(category.clone())),
                )
            });

        let fields = match self.draft.get(&self.tab) {
            Some(Value::Object(values)) => values
                .iter()
                .fold(Column::new().spacing(ui::SPACING), |col, (key, value)| {
                    col.push(self.field(&self.tab, key, value))
                }),
            _ => Column::new().push(text("Nothing to configure")),
        };

        let buttons = row![
            button("Reset to Defaults")
                .style(button::danger)
                .on_press(Message::Reset),
            horizontal_space(),
            button("Cancel")
                .style(button::secondary)
                .on_press(Message::Cancel),
            button("Apply").on_press(Message::Apply),
            button("OK").on_press(Message::Ok),
        ]
        .spacing(ui::SPACING);

        column![
            text("Settings").size(ui::HEADING_SIZE),
            tabs,
            container(scrollable(container(fields).padding(ui::PADDING)))
                .style(container::bordered_box)
                .height(Length::Fill),
            buttons,
        ]
        .spacing(ui::SPACING)
        .padding(ui::PADDING)
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor() -> SettingsEditor {
        SettingsEditor::new(&config::defaults())
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    #[test]
    fn starts_on_first_category() {
        assert_eq!(editor().tab, "scan_options");
    }

    #[test]
    fn edits_stay_in_draft_until_saved() {
        let mut e = editor();
        e.update(Message::Toggle(s("scan_options"), s("scan_pdf"), false));
        e.update(Message::Choice(s("interface"), s("dark_mode"), "dark"));

        assert_eq!(e.draft()["scan_options"]["scan_pdf"], json!(false));
        assert_eq!(e.draft()["interface"]["dark_mode"], json!("dark"));

        match e.update(Message::Ok) {
            Action::Save { settings, close } => {
                assert!(close);
                assert_eq!(settings["scan_options"]["scan_pdf"], json!(false));
            }
            _ => panic!("expected save"),
        }
        assert!(matches!(e.update(Message::Cancel), Action::Close));
    }

    #[test]
    fn only_valid_numbers_are_committed() {
        let mut e = editor();
        e.update(Message::Number(s("scan_options"), s("max_file_size"), s("4")));
        e.update(Message::Number(s("scan_options"), s("max_file_size"), s("4x")));
        assert_eq!(e.draft()["scan_options"]["max_file_size"], json!(4));
        e.update(Message::Number(s("scan_options"), s("max_file_size"), s("-3")));
        assert_eq!(e.draft()["scan_options"]["max_file_size"], json!(4));
        e.update(Message::Number(s("scan_options"), s("max_file_size"), s("250")));
        assert_eq!(e.draft()["scan_options"]["max_file_size"], json!(250));
    }

    #[test]
    fn list_add_and_remove() {
        let mut e = editor();
        e.update(Message::PendingItem(s("exclusions"), s("paths"), s(" /mnt/backup ")));
        e.update(Message::AddItem(s("exclusions"), s("paths")));
        // duplicates and blanks are ignored
        e.update(Message::PendingItem(s("exclusions"), s("paths"), s("/mnt/backup")));
        e.update(Message::AddItem(s("exclusions"), s("paths")));
        e.update(Message::AddItem(s("exclusions"), s("paths")));
        assert_eq!(e.draft()["exclusions"]["paths"], json!(["/mnt/backup"]));

        e.update(Message::RemoveItem(s("exclusions"), s("extensions"), 0));
        e.update(Message::RemoveItem(s("exclusions"), s("extensions"), 10));
        assert_eq!(e.draft()["exclusions"]["extensions"], json!([".log"]));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut e = editor();
        e.update(Message::Toggle(s("real_time"), s("enabled"), true));
        e.update(Message::Reset);
        assert_eq!(e.draft(), &config::defaults());
    }

    #[test]
    fn browsed_path_is_stored() {
        let mut e = editor();
        e.update(Message::Browsed(s("quarantine"), s("quarantine_path"), None));
        assert_eq!(
            e.draft()["quarantine"]["quarantine_path"],
            config::defaults()["quarantine"]["quarantine_path"]
        );
        e.update(Message::Browsed(
            s("quarantine"),
            s("quarantine_path"),
            Some(PathBuf::from("/srv/quarantine")),
        ));
        assert_eq!(e.draft()["quarantine"]["quarantine_path"], json!("/srv/quarantine"));
    }

    #[test]
    fn extensions_get_a_leading_dot() {
        let mut e = editor();
        e.update(Message::PendingItem(s("exclusions"), s("extensions"), s(" bak ")));
        e.update(Message::AddItem(s("exclusions"), s("extensions")));
        // already present once normalized
        e.update(Message::PendingItem(s("exclusions"), s("extensions"), s("tmp")));
        e.update(Message::AddItem(s("exclusions"), s("extensions")));
        assert_eq!(
            e.draft()["exclusions"]["extensions"],
            json!([".tmp", ".log", ".bak"])
        );

        // paths are kept as typed
        e.update(Message::PendingItem(s("exclusions"), s("paths"), s("srv")));
        e.update(Message::AddItem(s("exclusions"), s("paths")));
        assert_eq!(e.draft()["exclusions"]["paths"], json!(["srv"]));
    }
}
