use std::fmt;

use super::proto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    /// Rendered attribute path, e.g. `assume_role[0].role_arn`.
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary, detail)
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(attr) = &self.attribute {
            write!(f, "{}: ", attr)?;
        }
        if self.detail.is_empty() {
            f.write_str(&self.summary)
        } else {
            write!(f, "{}: {}", self.summary, self.detail)
        }
    }
}

impl From<proto::Diagnostic> for Diagnostic {
    fn from(d: proto::Diagnostic) -> Self {
        // Anything the plugin doesn't mark as a warning is treated as an error.
        let severity = match proto::diagnostic::Severity::try_from(d.severity) {
            Ok(proto::diagnostic::Severity::Warning) => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            severity,
            summary: d.summary,
            detail: d.detail,
            attribute: d.attribute.as_ref().and_then(render_path),
        }
    }
}

fn render_path(path: &proto::AttributePath) -> Option<String> {
    use proto::attribute_path::step::Selector;

    let mut out = String::new();
    for step in &path.steps {
        match &step.selector {
            Some(Selector::AttributeName(name)) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            Some(Selector::ElementKeyString(key)) => out.push_str(&format!("[{:?}]", key)),
            Some(Selector::ElementKeyInt(i)) => out.push_str(&format!("[{}]", i)),
            None => {}
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Diagnostics returned by a provider RPC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    /// Emits every warning through `tracing`.
    pub fn log_warnings(&self, context: &str) {
        for warning in self.warnings() {
            tracing::warn!(context, "{}", warning);
        }
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }
}

impl From<Vec<proto::Diagnostic>> for Diagnostics {
    fn from(diags: Vec<proto::Diagnostic>) -> Self {
        Self(diags.into_iter().map(Diagnostic::from).collect())
    }
}

/// Renders the error diagnostics the way Terraform reports them: a single
/// error inline, several as a bulleted list.
impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<&Diagnostic> = self.errors().collect();
        match errors.as_slice() {
            [] => f.write_str("no errors"),
            [only] => write!(f, "{}", only),
            many => {
                writeln!(f, "{} problems:", many.len())?;
                for diag in many {
                    write!(f, "\n- {}", diag)?;
                }
                Ok(())
            }
        }
    }
}
