//! Declarative command scripts.

/// One step of a command chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Wait for any of the patterns, discarding output up to and
    /// including the first match.
    Expect(Vec<String>),
    /// Write the text followed by a line terminator.
    SendLine(String),
    /// Capture output up to and including the delimiter.
    ReadUntil(u8),
}

/// Ordered list of steps, built fluently.
///
/// ```
/// use netharvest::telnet::Script;
///
/// let login = Script::new()
///     .expect(["sername: "])
///     .send_line("admin")
///     .expect(["assword: "]);
/// assert_eq!(login.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .push(Step::Expect(patterns.into_iter().map(Into::into).collect()));
        self
    }

    pub fn send_line(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::SendLine(text.into()));
        self
    }

    pub fn read_until(mut self, delimiter: u8) -> Self {
        self.steps.push(Step::ReadUntil(delimiter));
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
