//! Draw-command recording: a `DocumentEncoder` that remembers what it was told.
//!
//! Used for dry runs and for asserting on assembly without producing a PDF.

use crate::{CapturedRegion, DocumentEncoder, ExportOptions, PageSize, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PaintCommand {
    NewPage,
    #[serde(rename_all = "camelCase")]
    Image {
        pixel_width: u32,
        pixel_height: u32,
        x_mm: f64,
        y_mm: f64,
        width_mm: f64,
        height_mm: f64,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        x_mm: f64,
        y_mm: f64,
        size_pt: f64,
    },
}

/// Encoder that records every command instead of rendering.
#[derive(Debug, Clone)]
pub struct RecordingEncoder {
    page: PageSize,
    commands: Vec<PaintCommand>,
}

impl RecordingEncoder {
    pub fn page_size(&self) -> PageSize {
        self.page
    }

    /// Commands grouped per page (the `NewPage` markers themselves are dropped).
    pub fn pages(&self) -> Vec<Vec<PaintCommand>> {
        let mut pages = vec![Vec::new()];
        for cmd in &self.commands {
            match cmd {
                PaintCommand::NewPage => pages.push(Vec::new()),
                other => {
                    if let Some(last) = pages.last_mut() {
                        last.push(other.clone());
                    }
                }
            }
        }
        pages
    }

    /// Text drawn on each page, in drawing order.
    pub fn texts(&self) -> Vec<Vec<String>> {
        self.pages()
            .into_iter()
            .map(|cmds| {
                cmds.into_iter()
                    .filter_map(|c| match c {
                        PaintCommand::Text { text, .. } => Some(text),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }
}

impl DocumentEncoder for RecordingEncoder {
    fn new(options: &ExportOptions) -> Result<Self> {
        Ok(Self {
            page: options.page_size(),
            commands: Vec::new(),
        })
    }

    fn new_page(&mut self) -> Result<()> {
        self.commands.push(PaintCommand::NewPage);
        Ok(())
    }

    fn draw_image(
        &mut self,
        image: &CapturedRegion,
        x_mm: f64,
        y_mm: f64,
        width_mm: f64,
        height_mm: f64,
    ) -> Result<()> {
        self.commands.push(PaintCommand::Image {
            pixel_width: image.pixel_width,
            pixel_height: image.pixel_height,
            x_mm,
            y_mm,
            width_mm,
            height_mm,
        });
        Ok(())
    }

    fn draw_text(&mut self, text: &str, x_mm: f64, y_mm: f64, size_pt: f64) -> Result<()> {
        self.commands.push(PaintCommand::Text {
            text: text.to_string(),
            x_mm,
            y_mm,
            size_pt,
        });
        Ok(())
    }

    fn page_count(&self) -> usize {
        1 + self
            .commands
            .iter()
            .filter(|c| matches!(c, PaintCommand::NewPage))
            .count()
    }

    fn save(self, filename: &str) -> Result<()> {
        log::debug!(
            "recorded {} commands over {} pages for {}",
            self.commands.len(),
            self.page_count(),
            filename
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_commands_per_page() {
        let mut enc = RecordingEncoder::new(&ExportOptions::default()).unwrap();
        assert_eq!(enc.page_count(), 1);
        enc.draw_text("Generated", 10.0, 8.0, 8.0).unwrap();
        enc.new_page().unwrap();
        enc.draw_text("Revenue", 10.0, 16.0, 16.0).unwrap();

        assert_eq!(enc.page_count(), 2);
        assert_eq!(enc.texts(), vec![vec!["Generated".to_string()], vec!["Revenue".to_string()]]);
        assert_eq!(enc.page_size().width_mm, 210.0);
    }

    #[test]
    fn serializes_with_op_tag() {
        let cmd = PaintCommand::Text {
            text: "Hi".into(),
            x_mm: 1.0,
            y_mm: 2.0,
            size_pt: 8.0,
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["op"], "text");
        assert_eq!(v["sizePt"], 8.0);
    }
}
