//! Exam-results PDF export. Fixed layout: school header (logo when one is
//! present in the workspace), generation timestamp, student identity with the
//! derived current grade, the active filter line, a paginated results table
//! and a signature block that never splits across a page break.

use crate::{assets, validate};
use anyhow::{bail, Context};
use chrono::{Datelike, Local};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocumentReference, PdfLayerReference,
    Point, Rgb,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const INSTITUTION_NAME: &str = "Siri Seelananda Daham Pasala";

const PAGE_WIDTH: f64 = 215.9; // US Letter, mm
const PAGE_HEIGHT: f64 = 279.4;
const MARGIN: f64 = 19.05; // 0.75 in

const HEADER_ROW_HEIGHT: f64 = 12.0;
const DATA_ROW_HEIGHT: f64 = 10.0;
const SIGNATURE_BLOCK_HEIGHT: f64 = 32.0;

// Exam / Year / Marks / Grade column widths in mm.
const COL_WIDTHS: [f64; 4] = [63.5, 30.5, 30.5, 30.5];

#[derive(Debug, Clone)]
pub struct StudentInfo {
    pub id: i64,
    pub name: String,
    pub grade: String,
    pub registration_date: String,
}

#[derive(Debug, Clone)]
pub struct ExamRow {
    pub exam_name: String,
    pub exam_year: i64,
    pub marks_obtained: f64,
    pub grade: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    pub exam_name: Option<String>,
    pub exam_year: Option<i64>,
}

impl ReportFilters {
    fn description(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(name) = &self.exam_name {
            parts.push(format!("Exam: {}", name));
        }
        if let Some(year) = self.exam_year {
            parts.push(format!("Year: {}", year));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("Filters Applied: {}", parts.join(", ")))
        }
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn accent_color() -> Color {
    Color::Rgb(Rgb::new(0.122, 0.416, 0.647, None))
}

fn text_color() -> Color {
    Color::Rgb(Rgb::new(0.2, 0.2, 0.2, None))
}

fn filled_rect(layer: &PdfLayerReference, x: f64, y: f64, w: f64, h: f64, color: Color) {
    layer.set_fill_color(color);
    let rect = Line {
        points: vec![
            (Point::new(Mm(x), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y)), false),
            (Point::new(Mm(x + w), Mm(y + h)), false),
            (Point::new(Mm(x), Mm(y + h)), false),
        ],
        is_closed: true,
        has_fill: true,
        has_stroke: false,
        is_clipping_path: false,
    };
    layer.add_shape(rect);
    layer.set_fill_color(text_color());
}

fn new_page(doc: &PdfDocumentReference) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

/// Tries to embed `logo.png` / `logo.jpg` from the workspace root. Returns
/// false when no decodable logo exists, letting the caller fall back to the
/// plain text title.
fn try_embed_logo(workspace: &Path, layer: &PdfLayerReference, y_top: f64) -> bool {
    use printpdf::image_crate::codecs::{jpeg::JpegDecoder, png::PngDecoder};
    use printpdf::{Image, ImageTransform};

    let candidates = [("logo.png", true), ("logo.jpg", false), ("logo.jpeg", false)];
    for (name, is_png) in candidates {
        let path = workspace.join(name);
        if !path.is_file() {
            continue;
        }
        let Ok(mut file) = File::open(&path) else {
            continue;
        };
        let image = if is_png {
            PngDecoder::new(&mut file).ok().and_then(|d| Image::try_from(d).ok())
        } else {
            JpegDecoder::new(&mut file).ok().and_then(|d| Image::try_from(d).ok())
        };
        let Some(image) = image else {
            tracing::warn!(path = %path.display(), "logo file exists but could not be decoded");
            continue;
        };
        // Render at one inch tall: with dpi equal to the pixel height, one
        // inch of page space holds the full image height.
        let height_px = image.image.height.0 as f64;
        let dpi = if height_px > 0.0 { height_px } else { 300.0 };
        image.add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(y_top - 25.4)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        return true;
    }
    false
}

fn draw_table_header(layer: &PdfLayerReference, fonts: &Fonts, y: f64) -> f64 {
    let x = MARGIN;
    let total_width: f64 = COL_WIDTHS.iter().sum();
    filled_rect(layer, x, y - HEADER_ROW_HEIGHT, total_width, HEADER_ROW_HEIGHT, accent_color());
    layer.set_fill_color(Color::Rgb(Rgb::new(0.96, 0.96, 0.96, None)));
    let mut col_x = x + 2.0;
    for (title, width) in ["Exam", "Year", "Marks", "Grade"].iter().zip(COL_WIDTHS) {
        layer.use_text(*title, 12.0, Mm(col_x), Mm(y - 8.0), &fonts.bold);
        col_x += width;
    }
    layer.set_fill_color(text_color());
    y - HEADER_ROW_HEIGHT
}

fn draw_data_row(layer: &PdfLayerReference, fonts: &Fonts, y: f64, row: &ExamRow, shaded: bool) -> f64 {
    let x = MARGIN;
    let total_width: f64 = COL_WIDTHS.iter().sum();
    let fill = if shaded {
        Color::Rgb(Rgb::new(0.83, 0.83, 0.83, None))
    } else {
        Color::Rgb(Rgb::new(0.96, 0.96, 0.86, None))
    };
    filled_rect(layer, x, y - DATA_ROW_HEIGHT, total_width, DATA_ROW_HEIGHT, fill);

    let marks = format!("{}", row.marks_obtained);
    let cells = [
        row.exam_name.clone(),
        row.exam_year.to_string(),
        marks,
        row.grade.clone(),
    ];
    let mut col_x = x + 2.0;
    for (cell, width) in cells.iter().zip(COL_WIDTHS) {
        layer.use_text(cell.as_str(), 10.0, Mm(col_x), Mm(y - 7.0), &fonts.regular);
        col_x += width;
    }
    y - DATA_ROW_HEIGHT
}

fn draw_signature_block(layer: &PdfLayerReference, fonts: &Fonts, y: f64) {
    layer.use_text("Principal's Signature", 11.0, Mm(MARGIN), Mm(y - 14.0), &fonts.regular);
    layer.use_text(
        "______________________________",
        11.0,
        Mm(MARGIN),
        Mm(y - 24.0),
        &fonts.regular,
    );
}

/// Renders the report into the student's asset folder and returns the path
/// of the written file. Refuses to write anything for an empty row set.
pub fn generate_exam_results_pdf(
    workspace: &Path,
    student: &StudentInfo,
    rows: &[ExamRow],
    filters: &ReportFilters,
) -> anyhow::Result<PathBuf> {
    if rows.is_empty() {
        bail!("no exam results to export with current filters");
    }

    assets::ensure_student_folder(workspace, &student.name, student.id)?;
    let out_path = assets::report_path(workspace, &student.name, student.id);

    let (doc, page1, layer1) = printpdf::PdfDocument::new(
        "Exam Results",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };

    let mut layer = doc.get_page(page1).get_layer(layer1);
    layer.set_fill_color(text_color());
    let mut y = PAGE_HEIGHT - MARGIN;

    // Header: logo beside the school name, or the name alone.
    let has_logo = try_embed_logo(workspace, &layer, y);
    layer.set_fill_color(accent_color());
    let title_x = if has_logo { MARGIN + 30.0 } else { MARGIN };
    layer.use_text(INSTITUTION_NAME, 18.0, Mm(title_x), Mm(y - 14.0), &fonts.bold);
    layer.set_fill_color(text_color());
    y -= if has_logo { 32.0 } else { 22.0 };

    let generated = Local::now().format("%B %d, %Y at %I:%M %p").to_string();
    layer.use_text(
        format!("Report Generated: {}", generated),
        11.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 10.0;

    layer.use_text(
        format!("Student: {}", student.name),
        14.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.bold,
    );
    y -= 8.0;

    // Promotion policy: level advances by one per elapsed year since
    // registration, regardless of actual promotion records.
    let current_grade = validate::current_grade_level(
        &student.grade,
        &student.registration_date,
        Local::now().year(),
    );
    layer.use_text(
        format!("Grade: {}", current_grade),
        14.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.bold,
    );
    y -= 10.0;

    if let Some(desc) = filters.description() {
        layer.use_text(desc, 11.0, Mm(MARGIN), Mm(y), &fonts.regular);
        y -= 10.0;
    }

    y = draw_table_header(&layer, &fonts, y);
    for (i, row) in rows.iter().enumerate() {
        if y - DATA_ROW_HEIGHT < MARGIN {
            layer = new_page(&doc);
            layer.set_fill_color(text_color());
            y = PAGE_HEIGHT - MARGIN;
            y = draw_table_header(&layer, &fonts, y);
        }
        y = draw_data_row(&layer, &fonts, y, row, i % 2 == 0);
    }

    // The signature block stays whole: spill to a fresh page rather than
    // straddle the break.
    if y - SIGNATURE_BLOCK_HEIGHT < MARGIN {
        layer = new_page(&doc);
        layer.set_fill_color(text_color());
        y = PAGE_HEIGHT - MARGIN;
    }
    draw_signature_block(&layer, &fonts, y);

    let file = File::create(&out_path)
        .with_context(|| format!("failed to create report file {}", out_path.display()))?;
    doc.save(&mut BufWriter::new(file))
        .with_context(|| format!("failed to write report {}", out_path.display()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn sample_student() -> StudentInfo {
        StudentInfo {
            id: 1,
            name: "Jane Doe".to_string(),
            grade: "Grade 5".to_string(),
            registration_date: "2020-01-10".to_string(),
        }
    }

    fn sample_rows(n: usize) -> Vec<ExamRow> {
        (0..n)
            .map(|i| ExamRow {
                exam_name: "First Term".to_string(),
                exam_year: 2020 + (i % 5) as i64,
                marks_obtained: 80.0,
                grade: "A".to_string(),
            })
            .collect()
    }

    #[test]
    fn writes_a_pdf_into_the_student_folder() {
        let ws = temp_dir("studentd-report");
        let path =
            generate_exam_results_pdf(&ws, &sample_student(), &sample_rows(3), &ReportFilters::default())
                .expect("generate pdf");
        assert!(path.starts_with(ws.join("students").join("Jane_Doe_1")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Jane_Doe_1_exam_results_"), "{}", name);
        let bytes = std::fs::read(&path).expect("read pdf");
        assert!(bytes.starts_with(b"%PDF"), "not a pdf header");
        assert!(bytes.len() > 500);
        let _ = std::fs::remove_dir_all(ws);
    }

    #[test]
    fn long_result_sets_paginate() {
        // Separate workspaces: report filenames are timestamped to the
        // second, so back-to-back exports for one student would collide.
        let ws_few = temp_dir("studentd-report");
        let ws_many = temp_dir("studentd-report");
        let few = generate_exam_results_pdf(
            &ws_few,
            &sample_student(),
            &sample_rows(3),
            &ReportFilters::default(),
        )
        .expect("small pdf");
        let many = generate_exam_results_pdf(
            &ws_many,
            &sample_student(),
            &sample_rows(80),
            &ReportFilters::default(),
        )
        .expect("large pdf");
        let few_pages = count_pages(&std::fs::read(few).unwrap());
        let many_pages = count_pages(&std::fs::read(many).unwrap());
        assert_eq!(few_pages, 1);
        assert!(many_pages > 1, "80 rows should not fit one page");
        let _ = std::fs::remove_dir_all(ws_few);
        let _ = std::fs::remove_dir_all(ws_many);
    }

    #[test]
    fn empty_rows_refuse_to_export() {
        let ws = temp_dir("studentd-report");
        let err = generate_exam_results_pdf(&ws, &sample_student(), &[], &ReportFilters::default())
            .unwrap_err();
        assert!(err.to_string().contains("no exam results"));
        // No file should have been created.
        let folder = ws.join("students").join("Jane_Doe_1");
        assert!(!folder.exists());
        let _ = std::fs::remove_dir_all(ws);
    }

    fn count_pages(bytes: &[u8]) -> usize {
        // Page objects are uncompressed dictionary entries in printpdf output.
        let needle = b"/Type/Page";
        bytes
            .windows(needle.len())
            .filter(|w| w == needle)
            .count()
            .saturating_sub(1) // "/Type /Pages" root also matches
    }
}
