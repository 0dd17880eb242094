// quarantine page: lists quarantined files and lets the user restore
// or delete them

use crate::error::Error;
use crate::quarantine::{QuarantineEntry, QuarantineManager};
use crate::{platform, ui};
use iced::widget::{button, column, container, horizontal_space, row, scrollable, text, Column};
use iced::{Element, Length};

#[derive(Debug, Clone)]
pub enum Message {
    Refresh,
    Restore(usize),
    Delete(usize),
    Sweep,
    OpenFolder,
    Close,
}

pub enum Action {
    None,
    Close,
}

#[derive(Debug, Default)]
pub struct QuarantineView {
    entries: Vec<QuarantineEntry>,
    status: String,
}

impl QuarantineView {
    pub fn new(manager: Option<&QuarantineManager>) -> Self {
        let mut view = Self::default();
        view.refresh(manager);
        view
    }

    fn refresh(&mut self, manager: Option<&QuarantineManager>) {
        match manager.map(QuarantineManager::list) {
            Some(Ok(entries)) => {
                self.status = format!("{} quarantined file(s)", entries.len());
                self.entries = entries;
            }
            Some(Err(e)) => {
                ::log::error!("{}", e);
                self.status = e.to_string();
                self.entries.clear();
            }
            None => {
                self.status = "Quarantine directory is not available".into();
                self.entries.clear();
            }
        }
    }

    fn report(&mut self, manager: Option<&QuarantineManager>, done: &str, result: Result<(), Error>) {
        let status = match result {
            Ok(()) => done.to_string(),
            Err(e) => {
                ::log::error!("{}", e);
                e.to_string()
            }
        };
        self.refresh(manager);
        self.status = status;
    }

    pub fn update(
        &mut self,
        message: Message,
        manager: Option<&QuarantineManager>,
        retention_days: u64,
    ) -> Action {
        match message {
            Message::Refresh => self.refresh(manager),
            Message::Restore(i) => {
                if let (Some(m), Some(entry)) = (manager, self.entries.get(i).cloned()) {
                    let done = format!("Restored {}", entry.record.original_path.display());
                    self.report(manager, &done, m.restore(&entry));
                }
            }
            Message::Delete(i) => {
                if let (Some(m), Some(entry)) = (manager, self.entries.get(i).cloned()) {
                    let done = format!("Deleted {}", entry.file_name());
                    self.report(manager, &done, m.delete(&entry));
                }
            }
            Message::Sweep => {
                if let Some(m) = manager {
                    let result = m.sweep(retention_days).map(|n| {
                        format!("Removed {} file(s) older than {} days", n, retention_days)
                    });
                    match result {
                        Ok(done) => self.report(manager, &done, Ok(())),
                        Err(e) => self.report(manager, "", Err(e)),
                    }
                }
            }
            Message::OpenFolder => {
                if let Some(m) = manager {
                    if let Err(e) = platform::open_path(m.dir()) {
                        self.status = Error::PlatformError(e).to_string();
                    }
                }
            }
            Message::Close => return Action::Close,
        }
        Action::None
    }

    fn entry_view(i: usize, entry: &QuarantineEntry) -> Element<'_, Message> {
        let record = &entry.record;
        let date = record
            .quarantined_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.quarantine_date.clone());

        let details = column![
            text(record.threat_name.as_str()).size(ui::TEXT_SIZE + 2),
            text(format!("{}", record.original_path.display())).size(ui::TEXT_SIZE),
            text(format!("{}  |  {}", date, ui::format_size(record.file_size))).size(ui::TEXT_SIZE),
        ]
        .spacing(2);

        container(
            row![
                details,
                horizontal_space(),
                button("Restore").on_press(Message::Restore(i)),
                button("Delete")
                    .style(button::danger)
                    .on_press(Message::Delete(i)),
            ]
            .spacing(ui::SPACING)
            .align_y(iced::alignment::Vertical::Center),
        )
        .padding(ui::SPACING)
        .style(container::rounded_box)
        .into()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let list = if self.entries.is_empty() {
            Column::new().push(text("No files in quarantine"))
        } else {
            self.entries
                .iter()
                .enumerate()
                .fold(Column::new().spacing(ui::SPACING), |col, (i, e)| {
                    col.push(Self::entry_view(i, e))
                })
        };

        column![
            row![
                text("Quarantine").size(ui::HEADING_SIZE),
                horizontal_space(),
                button("Refresh").on_press(Message::Refresh),
                button("Clean Up Old Files").on_press(Message::Sweep),
                button("Open Folder").on_press(Message::OpenFolder),
                button("Back")
                    .style(button::secondary)
                    .on_press(Message::Close),
            ]
            .spacing(ui::SPACING),
            text(self.status.as_str()),
            scrollable(list).height(Length::Fill),
        ]
        .spacing(ui::SPACING)
        .padding(ui::PADDING)
        .into()
    }
}
