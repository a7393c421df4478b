// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcription and SOAP note generation.
//!
//! Both steps are delegated to external commands configured under
//! `[pipeline]`. Each command receives one JSON object on stdin and must
//! print one JSON object on stdout:
//!
//! - transcription: `{"audio_path": "..."}` -> `{"text": "..."}`
//! - note generation: `{"transcript": "...", "prompt": "..."}` ->
//!   `{"report": "..."}` or a structured summary
//!   (`{"summary", "subjects"?, "objects", "assessments"?, "plans"}`)
//!   which is rendered to SOAP markdown here.

use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};

use crate::embedding::run_json_command;
use crate::errors::{FaqError, Result};

/// Instruction handed to the note generator along with the transcript.
pub const SOAP_PROMPT_TEMPLATE: &str = "\
## Instructions
You assist home-visit nurses with their records. From the conversation \
transcript below, write a new nursing record in SOAP format.

## Constraints
- Use clinical terminology where appropriate.
- Write in the language of the transcript.
- Output markdown.

## Output format
## summary
XXX
## S
XXX
## O
XXX
## A
XXX
## P
XXX

## Conversation transcript
{transcript}
";

/// Fills [`SOAP_PROMPT_TEMPLATE`] with `transcript`.
pub fn soap_prompt(transcript: &str) -> String {
    SOAP_PROMPT_TEMPLATE.replace("{transcript}", transcript)
}

/// Turns an audio recording into text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Turns a transcript into a SOAP-format markdown note.
pub trait ReportGenerator: Send + Sync {
    fn generate_report(&self, transcript: &str) -> Result<String>;
}

/// Transcript and note produced for one recording.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProcessedRecording {
    pub transcript: String,
    pub report: String,
}

/// Transcribes `audio_path` and generates a note from the transcript.
pub fn process_recording(
    transcriber: &dyn Transcriber,
    generator: &dyn ReportGenerator,
    audio_path: &Path,
) -> Result<ProcessedRecording> {
    info!(path = %audio_path.display(), "processing recording");
    let transcript = transcriber.transcribe(audio_path)?;
    debug!(chars = transcript.chars().count(), "transcription finished");
    let report = generator.generate_report(&transcript)?;
    debug!(chars = report.chars().count(), "report generated");
    Ok(ProcessedRecording { transcript, report })
}

/// Structured nursing summary, one list per SOAP section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoapSummary {
    pub summary: String,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    pub objects: Vec<String>,
    #[serde(default)]
    pub assessments: Option<Vec<String>>,
    pub plans: Vec<String>,
}

impl SoapSummary {
    /// Renders the summary as markdown with `summary`, `S`, `O`, `A`, `P`
    /// sections. Missing or empty sections read "None".
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## summary\n");
        out.push_str(self.summary.trim());
        out.push('\n');
        push_section(&mut out, "S", self.subjects.as_deref().unwrap_or_default());
        push_section(&mut out, "O", &self.objects);
        push_section(
            &mut out,
            "A",
            self.assessments.as_deref().unwrap_or_default(),
        );
        push_section(&mut out, "P", &self.plans);
        out
    }
}

fn push_section(out: &mut String, heading: &str, entries: &[String]) {
    out.push_str("\n## ");
    out.push_str(heading);
    out.push('\n');
    let mut wrote = false;
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        out.push_str("- ");
        out.push_str(entry);
        out.push('\n');
        wrote = true;
    }
    if !wrote {
        out.push_str("- None\n");
    }
}

#[derive(Deserialize)]
struct TranscriptOutput {
    text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReportOutput {
    Markdown { report: String },
    Structured(SoapSummary),
}

/// Transcriber backed by an external command.
pub struct CommandTranscriber {
    command: String,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, audio_path: &Path) -> Result<String> {
        if !audio_path.is_file() {
            return Err(FaqError::InvalidArgument(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }
        let payload = json!({ "audio_path": audio_path.to_string_lossy() });
        let stdout = run_json_command(&self.command, &payload)
            .map_err(|e| FaqError::Collaborator(format!("transcription: {:#}", e)))?;
        let output: TranscriptOutput = serde_json::from_str(stdout.trim())
            .map_err(|e| FaqError::parse("transcription output", e))?;
        Ok(output.text)
    }
}

/// Note generator backed by an external command.
pub struct CommandReportGenerator {
    command: String,
}

impl CommandReportGenerator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl ReportGenerator for CommandReportGenerator {
    fn generate_report(&self, transcript: &str) -> Result<String> {
        let payload = json!({
            "transcript": transcript,
            "prompt": soap_prompt(transcript),
        });
        let stdout = run_json_command(&self.command, &payload)
            .map_err(|e| FaqError::Collaborator(format!("report generation: {:#}", e)))?;
        parse_report_output(&stdout)
    }
}

/// Parses note-generator stdout into SOAP markdown.
pub fn parse_report_output(stdout: &str) -> Result<String> {
    let output: ReportOutput = serde_json::from_str(stdout.trim())
        .map_err(|e| FaqError::parse("report output", e))?;
    Ok(match output {
        ReportOutput::Markdown { report } => report,
        ReportOutput::Structured(summary) => summary.to_markdown(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FixedTranscriber(&'static str);

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, _audio_path: &Path) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct EchoGenerator;

    impl ReportGenerator for EchoGenerator {
        fn generate_report(&self, transcript: &str) -> Result<String> {
            Ok(format!("## summary\n{}", transcript))
        }
    }

    #[test]
    fn prompt_embeds_transcript() {
        let prompt = soap_prompt("Blood pressure 120/80.");
        assert!(prompt.contains("## Conversation transcript\nBlood pressure 120/80."));
        assert!(prompt.contains("SOAP"));
        assert!(!prompt.contains("{transcript}"));
    }

    #[test]
    fn structured_summary_renders_all_sections() {
        let summary = SoapSummary {
            summary: "Subcutaneous infusion completed.".to_string(),
            subjects: Some(vec!["Feels tired".to_string()]),
            objects: vec!["Temp 36.8".to_string(), "No swelling".to_string()],
            assessments: None,
            plans: vec!["Continue observation".to_string()],
        };
        let md = summary.to_markdown();
        assert_eq!(
            md,
            "## summary\nSubcutaneous infusion completed.\n\
             \n## S\n- Feels tired\n\
             \n## O\n- Temp 36.8\n- No swelling\n\
             \n## A\n- None\n\
             \n## P\n- Continue observation\n"
        );
    }

    #[test]
    fn parse_markdown_report() {
        let report = parse_report_output(r###"{"report": "## summary\nok"}"###).unwrap();
        assert_eq!(report, "## summary\nok");
    }

    #[test]
    fn parse_structured_report() {
        let report = parse_report_output(
            r#"{"summary": "s", "objects": ["o"], "plans": ["p"]}"#,
        )
        .unwrap();
        assert!(report.starts_with("## summary\ns\n"));
        assert!(report.contains("## S\n- None"));
        assert!(report.contains("## O\n- o"));
    }

    #[test]
    fn parse_rejects_malformed_report() {
        let err = parse_report_output(r#"{"summary": "missing lists"}"#).unwrap_err();
        assert!(matches!(err, FaqError::Parse { .. }));

        let err = parse_report_output("not json").unwrap_err();
        assert!(matches!(err, FaqError::Parse { .. }));
    }

    #[test]
    fn process_recording_chains_collaborators() {
        let result = process_recording(
            &FixedTranscriber("Patient ate lunch."),
            &EchoGenerator,
            Path::new("visit.m4a"),
        )
        .unwrap();
        assert_eq!(result.transcript, "Patient ate lunch.");
        assert_eq!(result.report, "## summary\nPatient ate lunch.");
    }

    #[cfg(unix)]
    #[test]
    fn command_transcriber_reads_text() {
        let mut audio = tempfile::NamedTempFile::new().unwrap();
        audio.write_all(b"RIFF").unwrap();
        let transcriber =
            CommandTranscriber::new(r#"cat >/dev/null; printf '{"text":"hello nurse"}'"#);
        assert_eq!(transcriber.transcribe(audio.path()).unwrap(), "hello nurse");
    }

    #[cfg(unix)]
    #[test]
    fn command_transcriber_reports_failures() {
        let audio = tempfile::NamedTempFile::new().unwrap();
        let failing = CommandTranscriber::new("cat >/dev/null; echo boom >&2; exit 3");
        let err = failing.transcribe(audio.path()).unwrap_err();
        assert!(matches!(err, FaqError::Collaborator(ref msg) if msg.contains("boom")));

        let garbage = CommandTranscriber::new("cat >/dev/null; echo nope");
        let err = garbage.transcribe(audio.path()).unwrap_err();
        assert!(matches!(err, FaqError::Parse { .. }));
    }

    #[test]
    fn command_transcriber_requires_existing_file() {
        let transcriber = CommandTranscriber::new("true");
        let err = transcriber
            .transcribe(Path::new("/nonexistent/visit.m4a"))
            .unwrap_err();
        assert!(matches!(err, FaqError::InvalidArgument(_)));
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_receives_prompt() {
        // Echo whether the prompt field made it through.
        let generator = CommandReportGenerator::new(
            r#"if grep -q 'SOAP format' ; then printf '{"report":"got prompt"}'; else printf '{"report":"no prompt"}'; fi"#,
        );
        assert_eq!(generator.generate_report("transcript").unwrap(), "got prompt");
    }
}
