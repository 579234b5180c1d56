use chrono::{Datelike, Local, NaiveDate};

/// Exam names accepted by the latest schema. Earlier databases stored free
/// text; those rows survive migration untouched but new rows are restricted.
pub const EXAM_NAMES: [&str; 3] = ["First Term", "Second Term", "Third Term"];

pub const MIN_EXAM_YEAR: i32 = 2000;

fn is_letters_and_spaces(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphabetic() || c == ' ')
}

pub fn validate_student_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Student name is required".to_string());
    }
    if !is_letters_and_spaces(name) {
        return Err("Student name must contain only letters and spaces".to_string());
    }
    if name.chars().count() < 2 {
        return Err("Student name must be at least 2 characters".to_string());
    }
    Ok(())
}

pub fn validate_guardian_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Guardian name is required".to_string());
    }
    if !is_letters_and_spaces(name) {
        return Err("Guardian name must contain only letters and spaces".to_string());
    }
    if name.chars().count() < 2 {
        return Err("Guardian name must be at least 2 characters".to_string());
    }
    Ok(())
}

fn parse_iso_date(label: &str, s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} is required", label));
    }
    let bytes = s.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(format!("{} must be in YYYY-MM-DD format", label));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| "Invalid date - please check day and month values".to_string())
}

pub fn validate_date_of_birth(dob: &str) -> Result<(), String> {
    let date = parse_iso_date("Date of birth", dob)?;
    if date > Local::now().date_naive() {
        return Err("Date of birth cannot be in the future".to_string());
    }
    if date.year() < 1900 {
        return Err("Date of birth year must be after 1900".to_string());
    }
    Ok(())
}

pub fn validate_registration_date(reg_date: &str) -> Result<(), String> {
    let date = parse_iso_date("Registration date", reg_date)?;
    if date > Local::now().date_naive() {
        return Err("Registration date cannot be in the future".to_string());
    }
    Ok(())
}

pub fn validate_guardian_nic(nic: &str) -> Result<(), String> {
    let nic: String = nic.trim().chars().filter(|c| *c != ' ').collect();
    if nic.is_empty() {
        return Err("Guardian NIC is required".to_string());
    }
    if nic.len() != 12 || !nic.chars().all(|c| c.is_ascii_digit()) {
        return Err("Guardian NIC must be exactly 12 digits".to_string());
    }
    Ok(())
}

pub fn validate_guardian_contact(contact: &str) -> Result<(), String> {
    let contact: String = contact.trim().chars().filter(|c| *c != ' ').collect();
    if contact.is_empty() {
        return Err("Guardian contact is required".to_string());
    }
    if contact.len() != 10 || !contact.chars().all(|c| c.is_ascii_digit()) {
        return Err("Guardian contact must be exactly 10 digits".to_string());
    }
    Ok(())
}

pub fn validate_address(address: &str) -> Result<(), String> {
    let address = address.trim();
    if address.is_empty() {
        return Err("Address is required".to_string());
    }
    if address.chars().count() < 3 {
        return Err("Address must be at least 3 characters".to_string());
    }
    Ok(())
}

pub fn validate_gender(gender: &str) -> Result<(), String> {
    match gender.trim() {
        "Male" | "Female" => Ok(()),
        _ => Err("Gender must be Male or Female".to_string()),
    }
}

pub fn validate_exam_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Exam name is required".to_string());
    }
    if !EXAM_NAMES.contains(&name) {
        return Err("Exam name must be First Term, Second Term or Third Term".to_string());
    }
    Ok(())
}

pub fn validate_exam_year(year: &str) -> Result<(), String> {
    let year = year.trim();
    if year.is_empty() {
        return Err("Exam year is required".to_string());
    }
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return Err("Exam year must be exactly 4 digits".to_string());
    }
    let y: i32 = year.parse().map_err(|_| "Exam year must be exactly 4 digits".to_string())?;
    let current = Local::now().year();
    if y < MIN_EXAM_YEAR {
        return Err(format!("Exam year must be {} or later", MIN_EXAM_YEAR));
    }
    if y > current + 1 {
        return Err(format!("Exam year cannot be more than {}", current + 1));
    }
    Ok(())
}

pub fn validate_marks_obtained(marks: &str) -> Result<(), String> {
    let marks = marks.trim();
    if marks.is_empty() {
        return Err("Marks obtained is required".to_string());
    }
    let v: f64 = marks
        .parse()
        .map_err(|_| "Marks must be a valid number".to_string())?;
    if v < 0.0 {
        return Err("Marks cannot be negative".to_string());
    }
    if v > 100.0 {
        return Err("Marks cannot be more than 100".to_string());
    }
    Ok(())
}

/// Accepts either a bare level number or the "Grade N" form the dropdown
/// produces. Levels run 1 through 13.
pub fn validate_grade_level(grade: &str) -> Result<(), String> {
    let grade = grade.trim();
    if grade.is_empty() {
        return Err("Grade is required".to_string());
    }
    let digits = grade.strip_prefix("Grade ").unwrap_or(grade);
    let n: i32 = digits
        .parse()
        .map_err(|_| "Invalid grade format".to_string())?;
    if !(1..=13).contains(&n) {
        return Err("Grade must be between 1 and 13".to_string());
    }
    Ok(())
}

/// Letter grade from marks. Threshold table: A>=75, B>=65, C>=55, S>=35,
/// else W. Out-of-range input is the validator's problem; anything parseable
/// still maps through the table, anything else yields "".
pub fn letter_grade(marks: &str) -> &'static str {
    match marks.trim().parse::<f64>() {
        Ok(v) => letter_grade_value(v),
        Err(_) => "",
    }
}

pub fn letter_grade_value(marks: f64) -> &'static str {
    if marks >= 75.0 {
        "A"
    } else if marks >= 65.0 {
        "B"
    } else if marks >= 55.0 {
        "C"
    } else if marks >= 35.0 {
        "S"
    } else {
        "W"
    }
}

/// Grade level number out of a stored grade string ("Grade 5" or "5").
/// Falls back to 1 when unparseable, matching the report's behavior on
/// pre-migration rows.
pub fn grade_level_number(grade: &str) -> i32 {
    let digits = grade.trim().strip_prefix("Grade ").unwrap_or(grade.trim());
    digits.parse().unwrap_or(1)
}

/// Promotion policy used by the results report: the level advances by one
/// per elapsed calendar year since registration. Not validated against
/// actual promotion records.
pub fn current_grade_level(grade_at_registration: &str, registration_date: &str, current_year: i32) -> i32 {
    let registration_year = registration_date
        .split('-')
        .next()
        .and_then(|y| y.parse::<i32>().ok())
        .unwrap_or(current_year);
    grade_level_number(grade_at_registration) + (current_year - registration_year)
}
