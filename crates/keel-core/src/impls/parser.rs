//! DefaultJobspecParser - format に応じて JSON / structured-text を振り分け

use super::hcl_parser::HclJobspecParser;
use super::json_parser::JsonJobspecParser;
use crate::domain::{JobSpecification, JobspecFormat, ParseError, ParsedJob};
use crate::ports::JobspecParser;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJobspecParser {
    json: JsonJobspecParser,
    hcl: HclJobspecParser,
}

impl DefaultJobspecParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobspecParser for DefaultJobspecParser {
    fn parse(&self, spec: &JobSpecification) -> Result<ParsedJob, ParseError> {
        match spec.format {
            JobspecFormat::Json => self.json.parse(spec),
            JobspecFormat::StructuredText => self.hcl.parse(spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_format() {
        let parser = DefaultJobspecParser::new();

        let json = parser
            .parse(&JobSpecification::json(r#"{"ID": "a"}"#))
            .unwrap();
        let hcl = parser.parse(&JobSpecification::hcl("job \"a\" {}\n")).unwrap();
        assert_eq!(json.id, hcl.id);

        // JSON text is not valid structured text and vice versa
        assert!(parser.parse(&JobSpecification::hcl(r#"{"ID": "a"}"#)).is_err());
        assert!(parser.parse(&JobSpecification::json("job \"a\" {}")).is_err());
    }
}
