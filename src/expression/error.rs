use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExprError {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl ExprError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }

    /// 1-based `(line, column)` of the error inside `src`.
    pub(crate) fn line_col(&self, src: &str) -> (usize, usize) {
        let upto = src.get(..self.offset.min(src.len())).unwrap_or(src);
        let line = upto.matches('\n').count() + 1;
        let col = upto.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        (line, col)
    }

    /// Diagnostic with a line/column position, as reported to show authors.
    pub(crate) fn render(&self, src: &str) -> String {
        let (line, col) = self.line_col(src);
        format!("{line}:{col}: {}", self.message)
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ExprError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let src = "a\nbc d";
        let e = ExprError::new(5, "boom");
        assert_eq!(e.line_col(src), (2, 4));
        assert_eq!(e.render(src), "2:4: boom");
    }
}
