use super::item::Label;

/// Well-known runtime entry points. Built once per compilation and handed to
/// the passes that need to tell runtime calls apart from user calls.
#[derive(Debug, Clone)]
pub struct RuntimeSymbols {
    pub print: Label,
    pub input: Label,
    pub tensor_error: Label,
}

impl Default for RuntimeSymbols {
    fn default() -> Self {
        RuntimeSymbols {
            print: Label::new("print"),
            input: Label::new("input"),
            tensor_error: Label::new("tensor-error"),
        }
    }
}

impl RuntimeSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Label> {
        [&self.print, &self.input, &self.tensor_error]
            .into_iter()
            .find(|label| label.as_str() == name)
    }

    pub fn is_runtime(&self, label: &Label) -> bool {
        self.lookup(label.as_str()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_runtime_symbols() {
        let runtime = RuntimeSymbols::new();
        assert_eq!(runtime.lookup("print"), Some(&runtime.print));
        assert!(runtime.is_runtime(&Label::new("tensor-error")));
        assert!(!runtime.is_runtime(&Label::new("@print")));
    }
}
