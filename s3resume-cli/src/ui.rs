use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};
use console::{style, Emoji};
use human_bytes::human_bytes;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use s3resume_core::{format_age, PendingUpload, UploadId, UploadSnapshot, UploadState};
use std::collections::HashMap;
use std::time::Duration;

pub fn print_banner() {
    println!();
    println!("{}", style("  S3Resume  ").bold().white().on_blue());
    println!("{}", style("  Resumable multipart uploads to S3  ").dim());
    println!();
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Percentage bar for one file. Its position is the queue's percentage,
/// which includes bytes still in flight.
pub fn create_upload_pb(name: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:20!} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_prefix(name.to_string());
    pb.set_message("queued");
    pb
}

pub fn print_success(message: &str) {
    println!("{} {}", Emoji("✅", "OK"), style(message).green());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", Emoji("❌", "Error"), style(message).red());
}

/// One bar per queued file, stacked.
#[derive(Default)]
pub struct UploadBars {
    multi: MultiProgress,
    bars: HashMap<UploadId, ProgressBar>,
}

impl UploadBars {
    pub fn add(&mut self, id: UploadId, name: &str) {
        let pb = self.multi.add(create_upload_pb(name));
        self.bars.insert(id, pb);
    }

    pub fn get(&self, id: UploadId) -> Option<&ProgressBar> {
        self.bars.get(&id)
    }

    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }
}

pub fn print_summary(uploads: &[UploadSnapshot]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("File").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Size").add_attribute(Attribute::Bold).fg(Color::Green),
        Cell::new("Status").add_attribute(Attribute::Bold).fg(Color::Yellow),
        Cell::new("Remote Key").add_attribute(Attribute::Bold).fg(Color::Magenta),
        Cell::new("Error").add_attribute(Attribute::Bold).fg(Color::Red),
    ]);

    for upload in uploads {
        let status = if upload.state == UploadState::Complete {
            Cell::new("Complete").fg(Color::Green)
        } else {
            Cell::new(format!("Incomplete ({}%)", upload.percentage)).fg(Color::Red)
        };
        let error = upload
            .error
            .as_deref()
            .or(upload.registration_error.as_deref())
            .unwrap_or("");

        table.add_row(vec![
            Cell::new(&upload.name),
            Cell::new(human_bytes(upload.total_bytes as f64)),
            status,
            Cell::new(&upload.remote_key),
            Cell::new(error),
        ]);
    }

    println!("{table}");
}

pub fn print_pending(uploads: &[PendingUpload], now: DateTime<Utc>) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Key").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Upload ID").add_attribute(Attribute::Bold).fg(Color::Magenta),
        Cell::new("Age").add_attribute(Attribute::Bold).fg(Color::Yellow),
        Cell::new("Parts").add_attribute(Attribute::Bold).fg(Color::Green),
        Cell::new("Uploaded").add_attribute(Attribute::Bold).fg(Color::Green),
    ]);

    for upload in uploads {
        let age = upload
            .initiated
            .map(|initiated| format_age(initiated, now))
            .unwrap_or_else(|| "unknown".to_string());

        table.add_row(vec![
            Cell::new(&upload.key),
            Cell::new(&upload.upload_id),
            Cell::new(age),
            Cell::new(upload.parts_completed),
            Cell::new(human_bytes(upload.bytes_completed as f64)),
        ]);
    }

    println!("{table}");
}
