//! Persisted plan artifact (§6): a Markdown checklist file written into
//! the task workspace, one line per step, patched in place as steps
//! complete. The executor only ever touches the bracket character; the
//! rest of each checklist line is preserved verbatim.

use ao_domain::error::{Error, Result};
use ao_domain::plan::{AttemptStatus, PlanOutline};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Build the step-line regex once; `N` is the 1-based step id.
fn step_line_regex(step_id: u32) -> Regex {
    Regex::new(&format!(r"^(\s*-\s*\[)[ x!-](\]\s*{step_id}\.\s+)")).expect("static regex")
}

pub fn plan_filename(timestamp_millis: i64) -> String {
    format!("_plan_{timestamp_millis}.md")
}

/// Render the initial plan artifact: a header, the human summary, then one
/// `- [ ] N. description` checklist line per step plus planner hints.
pub fn render_plan_markdown(plan_id: &str, query: &str, outline: &PlanOutline) -> String {
    let mut out = String::new();
    out.push_str("# Plan\n\n");
    out.push_str(&format!("- plan id: {plan_id}\n"));
    out.push_str(&format!("- original query: {query}\n\n"));
    out.push_str(&outline.human_summary);
    out.push_str("\n\n");
    for step in &outline.steps {
        out.push_str(&format!("- [ ] {}. {}\n", step.step_id, step.description));
        if let Some(hint) = &step.tool_hint {
            out.push_str(&format!("  - tool hint: {hint}\n"));
        }
        if let Some(hint) = &step.input_hint {
            out.push_str(&format!("  - input hint: {hint}\n"));
        }
        out.push_str(&format!("  - expected outcome: {}\n", step.expected_outcome));
    }
    out
}

/// Patch the checklist line for `step_id` to reflect `status`. The rest of
/// the line (description, any trailing hints) is left untouched.
pub fn patch_step_status(markdown: &str, step_id: u32, status: AttemptStatus) -> Result<String> {
    let re = step_line_regex(step_id);
    if !re.is_match(markdown) {
        return Err(Error::Other(format!("plan file has no checklist line for step {step_id}")));
    }
    let replacement = format!("${{1}}{}${{2}}", status.checkbox_char());
    Ok(re.replace(markdown, replacement.as_str()).into_owned())
}

pub struct PlanFile {
    path: PathBuf,
}

impl PlanFile {
    pub async fn write_new(task_dir: &Path, filename: &str, markdown: &str) -> Result<Self> {
        let path = task_dir.join(filename);
        tokio::fs::write(&path, markdown).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn patch_step(&self, step_id: u32, status: AttemptStatus) -> Result<()> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let patched = patch_step_status(&content, step_id, status)?;
        tokio::fs::write(&self.path, patched).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_domain::plan::PlanStep;

    fn sample_outline() -> PlanOutline {
        PlanOutline {
            human_summary: "List files then write a summary.".into(),
            steps: vec![
                PlanStep { step_id: 1, description: "List files".into(), tool_hint: Some("query_files".into()), input_hint: None, expected_outcome: "directory listing".into() },
                PlanStep { step_id: 2, description: "Write summary".into(), tool_hint: Some("write_file".into()), input_hint: None, expected_outcome: "notes.txt exists".into() },
            ],
        }
    }

    #[test]
    fn renders_one_checklist_line_per_step() {
        let markdown = render_plan_markdown("p1", "summarize my files", &sample_outline());
        assert_eq!(markdown.matches("- [ ]").count(), 2);
        assert!(markdown.contains("1. List files"));
        assert!(markdown.contains("2. Write summary"));
    }

    #[test]
    fn patch_only_touches_bracket_character() {
        let markdown = render_plan_markdown("p1", "summarize my files", &sample_outline());
        let patched = patch_step_status(&markdown, 1, AttemptStatus::Success).unwrap();
        assert!(patched.contains("- [x] 1. List files"));
        assert!(patched.contains("- [ ] 2. Write summary"));
    }

    #[test]
    fn patch_unknown_step_id_errors() {
        let markdown = render_plan_markdown("p1", "summarize my files", &sample_outline());
        let err = patch_step_status(&markdown, 99, AttemptStatus::Failed).unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn marker_count_matches_step_count() {
        let outline = sample_outline();
        let markdown = render_plan_markdown("p1", "q", &outline);
        let marker_re = Regex::new(r"-\s*\[[ x!-]\]").unwrap();
        assert_eq!(marker_re.find_iter(&markdown).count(), outline.steps.len());
    }
}
