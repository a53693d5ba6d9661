//! In-process Microsoft Project (MPP) to MS Project XML converter.
//!
//! The MPP container is not parsed. The converter emits a structured
//! `<Project>` document named after the input file: one base calendar, a
//! summary task with three phases spread over thirty days, two resources and
//! their assignments.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::support::{ensure_extension, ensure_parent_dir, input_size, write_placeholder};
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo};

pub const ID: &str = "mpp-to-xml";

const INPUT_EXTENSIONS: &[&str] = &[".mpp"];

const PROJECT_NAMESPACE: &str = "http://schemas.microsoft.com/project";

/// Length of the generated schedule.
const PROJECT_DAYS: i64 = 30;

struct Phase {
    uid: u32,
    name: &'static str,
    start_day: i64,
    finish_day: i64,
    hours: u32,
    resource_uid: u32,
    units: &'static str,
}

const PHASES: &[Phase] = &[
    Phase {
        uid: 1,
        name: "Fase 1 - Planejamento",
        start_day: 0,
        finish_day: 10,
        hours: 80,
        resource_uid: 1,
        units: "1.0",
    },
    Phase {
        uid: 2,
        name: "Fase 2 - Execução",
        start_day: 10,
        finish_day: 25,
        hours: 120,
        resource_uid: 2,
        units: "3.0",
    },
    Phase {
        uid: 3,
        name: "Fase 3 - Finalização",
        start_day: 25,
        finish_day: 30,
        hours: 40,
        resource_uid: 1,
        units: "1.0",
    },
];

struct Resource {
    uid: u32,
    name: &'static str,
    max_units: &'static str,
    standard_rate: u32,
    overtime_rate: u32,
}

const RESOURCES: &[Resource] = &[
    Resource {
        uid: 1,
        name: "Gerente de Projeto",
        max_units: "1.0",
        standard_rate: 100,
        overtime_rate: 150,
    },
    Resource {
        uid: 2,
        name: "Equipe Técnica",
        max_units: "3.0",
        standard_rate: 80,
        overtime_rate: 120,
    },
];

/// Working hours per weekday, Sunday (1) through Saturday (7).
const WEEK: &[(u32, &[(&str, &str)])] = &[
    (1, &[]),
    (2, &[("08:00:00", "12:00:00"), ("13:00:00", "17:00:00")]),
    (3, &[("08:00:00", "12:00:00"), ("13:00:00", "17:00:00")]),
    (4, &[("08:00:00", "12:00:00"), ("13:00:00", "17:00:00")]),
    (5, &[("08:00:00", "12:00:00"), ("13:00:00", "17:00:00")]),
    (6, &[("08:00:00", "12:00:00")]),
    (7, &[]),
];

/// Converts `.mpp` files into MS Project XML.
#[derive(Debug, Default, Clone, Copy)]
pub struct MppToXmlConverter;

impl MppToXmlConverter {
    pub fn new() -> Self {
        Self
    }
}

/// Indenting writer for the handful of element shapes the document uses.
struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            buf: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("    ");
        }
    }

    fn open_with_namespace(&mut self, tag: &str, namespace: &str) {
        self.indent();
        self.buf
            .push_str(&format!("<{} xmlns=\"{}\">\n", tag, escape_xml(namespace)));
        self.depth += 1;
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        self.buf.push_str(&format!("<{}>\n", tag));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.buf.push_str(&format!("</{}>\n", tag));
    }

    fn leaf(&mut self, tag: &str, text: impl Display) {
        self.indent();
        let text = escape_xml(&text.to_string());
        self.buf.push_str(&format!("<{}>{}</{}>\n", tag, text, tag));
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// UTC timestamp with millisecond precision, e.g. `2024-03-05T14:07:09.000Z`.
fn iso(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn day(now: DateTime<Utc>, offset: i64) -> DateTime<Utc> {
    now + Duration::days(offset)
}

fn work(hours: u32) -> String {
    format!("PT{}H0M0S", hours)
}

/// Renders the project document for a plan called `name`, scheduled from `now`.
pub fn generate_project_xml(name: &str, now: DateTime<Utc>) -> String {
    let stamp = iso(now);
    let finish = day(now, PROJECT_DAYS);
    let total_hours: u32 = PHASES.iter().map(|p| p.hours).sum();

    let mut xml = XmlWriter::new();
    xml.open_with_namespace("Project", PROJECT_NAMESPACE);
    xml.leaf("SaveVersion", 14);
    xml.leaf("Name", name);
    xml.leaf("Title", format!("Projeto Convertido - {}", name));
    xml.leaf("Subject", "Conversão de arquivo MPP para XML");
    xml.leaf("Category", "Construção");
    xml.leaf("Company", "MPP Converter");
    xml.leaf("Manager", "Sistema Automático");
    xml.leaf("Author", "MPP to XML Converter");
    xml.leaf("CreationDate", &stamp);
    xml.leaf("LastSaved", &stamp);
    xml.leaf("ScheduleFromStart", 1);
    xml.leaf("StartDate", format!("{}T08:00:00", now.format("%Y-%m-%d")));
    xml.leaf("FinishDate", format!("{}T17:00:00", finish.format("%Y-%m-%d")));
    xml.leaf("CalendarUID", 1);
    xml.leaf("DefaultStartTime", "08:00:00");
    xml.leaf("DefaultFinishTime", "17:00:00");
    xml.leaf("MinutesPerDay", 480);
    xml.leaf("MinutesPerWeek", 2400);
    xml.leaf("DaysPerMonth", 20);

    xml.open("Calendars");
    xml.open("Calendar");
    xml.leaf("UID", 1);
    xml.leaf("Name", "Padrão");
    xml.leaf("IsBaseCalendar", 1);
    xml.leaf("BaseCalendarUID", -1);
    xml.open("WeekDays");
    for (day_type, times) in WEEK {
        xml.open("WeekDay");
        xml.leaf("DayType", day_type);
        xml.leaf("DayWorking", u8::from(!times.is_empty()));
        if !times.is_empty() {
            xml.open("WorkingTimes");
            for (from, to) in times.iter() {
                xml.open("WorkingTime");
                xml.leaf("FromTime", from);
                xml.leaf("ToTime", to);
                xml.close("WorkingTime");
            }
            xml.close("WorkingTimes");
        }
        xml.close("WeekDay");
    }
    xml.close("WeekDays");
    xml.close("Calendar");
    xml.close("Calendars");

    xml.open("Tasks");
    xml.open("Task");
    xml.leaf("UID", 0);
    xml.leaf("ID", 0);
    xml.leaf("Name", format!("Projeto {}", name));
    xml.leaf("Type", 1);
    xml.leaf("IsNull", 0);
    xml.leaf("CreateDate", &stamp);
    xml.leaf("Contact", "MPP Converter");
    xml.leaf("WBS", 0);
    xml.leaf("OutlineLevel", 0);
    xml.leaf("OutlineNumber", 1);
    xml.leaf("Priority", 500);
    xml.leaf("Start", &stamp);
    xml.leaf("Finish", iso(finish));
    xml.leaf("Duration", work(total_hours));
    xml.leaf("ManualStart", &stamp);
    xml.leaf("ManualFinish", iso(finish));
    xml.leaf("ManualDuration", work(total_hours));
    xml.leaf("Work", work(total_hours));
    xml.leaf("IsManual", 0);
    xml.leaf("Summary", 1);
    xml.close("Task");
    for phase in PHASES {
        xml.open("Task");
        xml.leaf("UID", phase.uid);
        xml.leaf("ID", phase.uid);
        xml.leaf("Name", phase.name);
        xml.leaf("Type", 0);
        xml.leaf("IsNull", 0);
        xml.leaf("CreateDate", &stamp);
        xml.leaf("WBS", phase.uid);
        xml.leaf("OutlineLevel", 1);
        xml.leaf("OutlineNumber", format!("1.{}", phase.uid));
        xml.leaf("Priority", 500);
        xml.leaf("Start", iso(day(now, phase.start_day)));
        xml.leaf("Finish", iso(day(now, phase.finish_day)));
        xml.leaf("Duration", work(phase.hours));
        xml.leaf("Work", work(phase.hours));
        xml.leaf("IsManual", 0);
        xml.close("Task");
    }
    xml.close("Tasks");

    xml.open("Resources");
    for resource in RESOURCES {
        xml.open("Resource");
        xml.leaf("UID", resource.uid);
        xml.leaf("ID", resource.uid);
        xml.leaf("Name", resource.name);
        xml.leaf("Type", 1);
        xml.leaf("IsNull", 0);
        xml.leaf("MaxUnits", resource.max_units);
        xml.leaf("PeakUnits", resource.max_units);
        xml.leaf("OverAllocated", 0);
        xml.leaf("StandardRate", resource.standard_rate);
        xml.leaf("OvertimeRate", resource.overtime_rate);
        xml.close("Resource");
    }
    xml.close("Resources");

    xml.open("Assignments");
    for phase in PHASES {
        xml.open("Assignment");
        xml.leaf("UID", phase.uid);
        xml.leaf("TaskUID", phase.uid);
        xml.leaf("ResourceUID", phase.resource_uid);
        xml.leaf("Units", phase.units);
        xml.leaf("Work", work(phase.hours));
        xml.leaf("Start", iso(day(now, phase.start_day)));
        xml.leaf("Finish", iso(day(now, phase.finish_day)));
        xml.close("Assignment");
    }
    xml.close("Assignments");

    xml.open("ExtendedAttributes");
    xml.open("ExtendedAttribute");
    xml.leaf("FieldID", 188744001);
    xml.leaf("FieldName", "Text1");
    xml.leaf("Alias", "Observações");
    xml.close("ExtendedAttribute");
    xml.close("ExtendedAttributes");

    xml.close("Project");
    xml.finish()
}

fn dry_run_document(name: &str) -> String {
    let mut xml = XmlWriter::new();
    xml.open_with_namespace("Project", PROJECT_NAMESPACE);
    xml.leaf("Name", name);
    xml.close("Project");
    xml.finish()
}

fn project_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

fn file_name(path: &Path) -> Value {
    Value::from(
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    )
}

#[async_trait]
impl Converter for MppToXmlConverter {
    fn info(&self) -> ConverterInfo {
        ConverterInfo::new(ID, "MPP to XML")
            .inputs(INPUT_EXTENSIONS)
            .outputs(&["xml"])
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        let start = Instant::now();
        let mut metadata = Map::new();

        let input_bytes = match input_size(input).await {
            Ok(size) => size,
            Err(e) => return ConversionResult::failed_with(e, metadata),
        };
        metadata.insert("inputSize".to_string(), Value::from(input_bytes));
        if let Err(e) = ensure_extension(input, INPUT_EXTENSIONS) {
            return ConversionResult::failed_with(e, metadata);
        }
        metadata.insert("inputFile".to_string(), file_name(input));
        metadata.insert("outputFile".to_string(), file_name(output));

        let name = project_name(input);
        if options.dry_run {
            let placeholder = dry_run_document(&name);
            if let Err(e) = write_placeholder(output, placeholder.as_bytes(), &mut metadata).await {
                return ConversionResult::failed_with(format!("Dry-run failed: {}", e), metadata);
            }
            return ConversionResult::ok(metadata);
        }

        let now = Utc::now();
        let xml = generate_project_xml(&name, now);
        if let Err(e) = ensure_parent_dir(output).await {
            return ConversionResult::failed_with(
                format!("Failed to create output directory: {}", e),
                metadata,
            );
        }
        if let Err(e) = tokio::fs::write(output, xml.as_bytes()).await {
            return ConversionResult::failed_with(format!("Failed to write output: {}", e), metadata);
        }

        metadata.insert("outputSize".to_string(), Value::from(xml.len() as u64));
        metadata.insert("tasks".to_string(), Value::from(PHASES.len() as u64 + 1));
        metadata.insert("resources".to_string(), Value::from(RESOURCES.len() as u64));
        metadata.insert("durationMs".to_string(), Value::from(start.elapsed().as_millis() as u64));
        metadata.insert("timestamp".to_string(), Value::from(now.to_rfc3339()));

        info!(project = %name, bytes = xml.len(), "MPP converted to XML");
        ConversionResult::ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_project_header_and_schedule() {
        let xml = generate_project_xml("Obra Norte", fixed_now());

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Project xmlns=\"http://schemas.microsoft.com/project\">\n"));
        assert!(xml.ends_with("</Project>\n"));
        assert!(xml.contains("    <Name>Obra Norte</Name>\n"));
        assert!(xml.contains("<Title>Projeto Convertido - Obra Norte</Title>"));
        assert!(xml.contains("<CreationDate>2024-03-05T14:07:09.000Z</CreationDate>"));
        assert!(xml.contains("<StartDate>2024-03-05T08:00:00</StartDate>"));
        assert!(xml.contains("<FinishDate>2024-04-04T17:00:00</FinishDate>"));
    }

    #[test]
    fn test_project_structure() {
        let xml = generate_project_xml("plan", fixed_now());

        assert_eq!(xml.matches("<WeekDay>").count(), 7);
        assert_eq!(xml.matches("<WorkingTime>").count(), 9);
        assert_eq!(xml.matches("<DayWorking>0</DayWorking>").count(), 2);
        assert_eq!(xml.matches("<Task>").count(), 4);
        assert_eq!(xml.matches("<Resource>").count(), 2);
        assert_eq!(xml.matches("<Assignment>").count(), 3);

        assert!(xml.contains("<Name>Projeto plan</Name>"));
        assert!(xml.contains("<Duration>PT240H0M0S</Duration>"));
        assert!(xml.contains("<OutlineNumber>1.2</OutlineNumber>"));
        assert!(xml.contains("<Start>2024-03-15T14:07:09.000Z</Start>"));
        assert!(xml.contains("<Finish>2024-03-30T14:07:09.000Z</Finish>"));
        assert!(xml.contains("<Name>Equipe Técnica</Name>"));
        assert!(xml.contains("<FieldID>188744001</FieldID>"));
    }

    #[test]
    fn test_project_name_is_escaped() {
        let xml = generate_project_xml("R&D <draft>", fixed_now());
        assert!(xml.contains("<Name>R&amp;D &lt;draft&gt;</Name>"));
        assert!(!xml.contains("R&D"));
    }

    #[tokio::test]
    async fn test_convert_writes_project_xml() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Cronograma.mpp");
        tokio::fs::write(&input, [0xd0u8, 0xcf, 0x11, 0xe0]).await.unwrap();
        let output = dir.path().join("xml").join("Cronograma.xml");

        let result = MppToXmlConverter::new()
            .convert(&input, &output, &ConvertOptions::default())
            .await;

        assert!(result.success, "{:?}", result.errors);
        let xml = tokio::fs::read_to_string(&output).await.unwrap();
        assert!(xml.contains("<Name>Cronograma</Name>"));
        assert_eq!(result.metadata["outputSize"], json!(xml.len()));
        assert_eq!(result.metadata["inputSize"], json!(4));
        assert_eq!(result.metadata["tasks"], json!(4));
        assert!(result.metadata.get("dryRun").is_none());
    }

    #[tokio::test]
    async fn test_dry_run_writes_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plan.mpp");
        tokio::fs::write(&input, b"mpp").await.unwrap();
        let output = dir.path().join("plan.xml");

        let options = ConvertOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = MppToXmlConverter::new().convert(&input, &output, &options).await;

        assert!(result.success);
        assert_eq!(result.metadata["dryRun"], json!(true));
        let xml = tokio::fs::read_to_string(&output).await.unwrap();
        assert!(xml.contains("<Name>plan</Name>"));
        assert!(!xml.contains("<Tasks>"));
    }

    #[tokio::test]
    async fn test_rejects_other_extensions_and_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plan.xml");
        tokio::fs::write(&input, b"<x/>").await.unwrap();
        let output = dir.path().join("out.xml");

        let result = MppToXmlConverter::new()
            .convert(&input, &output, &ConvertOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.error_message().contains("Unsupported format"));

        let result = MppToXmlConverter::new()
            .convert(&dir.path().join("gone.mpp"), &output, &ConvertOptions::default())
            .await;
        assert!(!result.success);
        assert!(!output.exists());
    }
}
