//! HclJobspecParser - structured-text jobspec の構造スキャナ
//!
//! 完全な HCL2 評価器ではありません。reconciler が必要とするのは
//! job のヘッダ（id, name, namespace, type, rollout 設定）だけなので、
//! 以下だけを行います。
//!
//! 1. 字句解析（識別子・文字列・heredoc・数値・記号・コメント）
//! 2. ブロック / 属性の木を組み立てる
//! 3. 検証
//!    - `allow_fs = false` のとき filesystem 関数（`file(...)` など）を拒否
//!    - default のない `variable` が未指定なら拒否
//! 4. リテラルと `var.x` 参照だけを評価してヘッダを取り出す

use std::collections::BTreeMap;

use crate::domain::{JobSpecification, JobType, ParseError, ParsedJob};
use crate::ports::JobspecParser;

const FS_FUNCTIONS: &[&str] = &[
    "abspath",
    "file",
    "filebase64",
    "fileexists",
    "fileset",
    "pathexpand",
    "templatefile",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HclJobspecParser;

impl HclJobspecParser {
    pub fn new() -> Self {
        Self
    }
}

impl JobspecParser for HclJobspecParser {
    fn parse(&self, spec: &JobSpecification) -> Result<ParsedJob, ParseError> {
        let tokens = Lexer::new(&spec.source).tokenize()?;
        if !spec.allow_fs {
            reject_fs_functions(&tokens)?;
        }
        let body = Parser::new(tokens).document()?;
        let variables = resolve_variables(&body, &spec.variables)?;
        extract_job(&body, &Evaluator { variables: &variables })
    }
}

// ========================================
// 字句解析
// ========================================

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Lit(String),
    /// Raw text between `${` and `}` (or `%{` and `}`).
    Interp(String),
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(Vec<Segment>),
    Number(String),
    Punct(char),
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax(self.line, self.column, message)
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);
            let kind = match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                    continue;
                }
                '\n' => {
                    self.bump();
                    TokenKind::Newline
                }
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' if self.peek_at(1) == Some('/') => {
                    self.skip_line();
                    continue;
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.skip_block_comment()?;
                    continue;
                }
                '"' => {
                    self.bump();
                    TokenKind::Str(self.template(true)?)
                }
                '<' if self.peek_at(1) == Some('<')
                    && self
                        .peek_at(2)
                        .is_some_and(|c| c == '-' || c.is_ascii_alphabetic()) =>
                {
                    TokenKind::Str(self.heredoc()?)
                }
                c if c.is_ascii_digit() => TokenKind::Number(self.number()),
                c if c.is_alphabetic() || c == '_' => TokenKind::Ident(self.ident()),
                c if "{}[]()=,.:?!<>+-*/%&|".contains(c) => {
                    self.bump();
                    TokenKind::Punct(c)
                }
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            };
            tokens.push(Token { kind, line, column });
        }
        Ok(tokens)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        loop {
            match self.bump() {
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(ParseError::syntax(line, column, "unterminated comment")),
            }
        }
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-') && out.ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    /// Template body. `quoted`: ends at `"`, processes escapes, no newlines.
    /// Otherwise runs to the end of input (heredoc content).
    fn template(&mut self, quoted: bool) -> Result<Vec<Segment>, ParseError> {
        let (line, column) = (self.line, self.column);
        let mut segments = Vec::new();
        let mut literal = String::new();
        loop {
            let Some(c) = self.bump() else {
                if quoted {
                    return Err(ParseError::syntax(line, column, "unterminated string"));
                }
                break;
            };
            match c {
                '"' if quoted => break,
                '\n' if quoted => {
                    return Err(ParseError::syntax(line, column, "unterminated string"));
                }
                '\\' if quoted => match self.bump() {
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some('r') => literal.push('\r'),
                    Some('"') => literal.push('"'),
                    Some('\\') => literal.push('\\'),
                    Some(other) => {
                        literal.push('\\');
                        literal.push(other);
                    }
                    None => return Err(ParseError::syntax(line, column, "unterminated string")),
                },
                '$' | '%' if self.peek() == Some(c) && self.peek_at(1) == Some('{') => {
                    // `$${` / `%%{` escape a literal `${` / `%{`
                    self.bump();
                    self.bump();
                    literal.push(c);
                    literal.push('{');
                }
                '$' | '%' if self.peek() == Some('{') => {
                    self.bump();
                    if !literal.is_empty() {
                        segments.push(Segment::Lit(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Interp(self.interpolation()?));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Lit(literal));
        }
        Ok(segments)
    }

    /// Raw text up to the `}` matching an already consumed `${`.
    fn interpolation(&mut self) -> Result<String, ParseError> {
        let (line, column) = (self.line, self.column);
        let mut depth = 0usize;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::syntax(line, column, "unterminated interpolation")),
                Some('}') if depth == 0 => {
                    self.bump();
                    return Ok(out.trim().trim_matches('~').trim().to_string());
                }
                Some('"') => {
                    let start = self.pos;
                    self.bump();
                    self.template(true)?;
                    out.extend(&self.chars[start..self.pos]);
                }
                Some(c) => {
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    out.push(c);
                    self.bump();
                }
            }
        }
    }

    fn heredoc(&mut self) -> Result<Vec<Segment>, ParseError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        let indented = self.peek() == Some('-');
        if indented {
            self.bump();
        }
        let marker = self.ident();
        if marker.is_empty() {
            return Err(ParseError::syntax(line, column, "heredoc needs a marker"));
        }
        self.skip_line();
        if self.bump().is_none() {
            return Err(ParseError::syntax(line, column, "unterminated heredoc"));
        }

        let mut lines = Vec::new();
        loop {
            let mut current = String::new();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                current.push(c);
                self.bump();
            }
            if current.trim() == marker {
                break;
            }
            if self.bump().is_none() {
                return Err(ParseError::syntax(line, column, "unterminated heredoc"));
            }
            lines.push(current);
        }

        if indented {
            let indent = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.len() - l.trim_start().len())
                .min()
                .unwrap_or(0);
            for l in &mut lines {
                *l = l.chars().skip(indent).collect();
            }
        }
        let mut content = lines.join("\n");
        content.push('\n');
        Lexer::new(&content).template(false)
    }
}

fn reject_fs_functions(tokens: &[Token]) -> Result<(), ParseError> {
    match find_fs_call(tokens)? {
        Some((name, line)) => Err(ParseError::FilesystemDisabled(format!(
            "{name}() at line {line}"
        ))),
        None => Ok(()),
    }
}

/// First filesystem function call, searching inside interpolations too.
fn find_fs_call(tokens: &[Token]) -> Result<Option<(String, usize)>, ParseError> {
    for (i, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Ident(name)
                if FS_FUNCTIONS.contains(&name.as_str())
                    && tokens.get(i + 1).map(|t| &t.kind) == Some(&TokenKind::Punct('(')) =>
            {
                return Ok(Some((name.clone(), token.line)));
            }
            TokenKind::Str(segments) => {
                for segment in segments {
                    if let Segment::Interp(raw) = segment {
                        let inner = Lexer::new(raw).tokenize()?;
                        if let Some((name, _)) = find_fs_call(&inner)? {
                            return Ok(Some((name, token.line)));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

// ========================================
// 構文解析
// ========================================

#[derive(Debug, Default)]
struct Body {
    attributes: Vec<Attribute>,
    blocks: Vec<Block>,
}

impl Body {
    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn blocks<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    fn block<'a>(&'a self, kind: &'a str) -> Option<&'a Block> {
        self.blocks(kind).next()
    }
}

#[derive(Debug)]
struct Attribute {
    name: String,
    expr: Vec<Token>,
    line: usize,
    column: usize,
}

#[derive(Debug)]
struct Block {
    kind: String,
    labels: Vec<String>,
    body: Body,
    line: usize,
    column: usize,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eof_error(&self, message: &str) -> ParseError {
        let (line, column) = self
            .tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        ParseError::syntax(line, column, message)
    }

    fn document(mut self) -> Result<Body, ParseError> {
        self.body(false)
    }

    fn body(&mut self, nested: bool) -> Result<Body, ParseError> {
        let mut body = Body::default();
        loop {
            while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Newline)) {
                self.pos += 1;
            }
            let Some(token) = self.next() else {
                if nested {
                    return Err(self.eof_error("unclosed block"));
                }
                return Ok(body);
            };
            match token.kind {
                TokenKind::Punct('}') if nested => return Ok(body),
                TokenKind::Ident(name) => {
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Punct('='))) {
                        self.pos += 1;
                        let expr = self.expression(token.line, token.column)?;
                        body.attributes.push(Attribute {
                            name,
                            expr,
                            line: token.line,
                            column: token.column,
                        });
                    } else {
                        let labels = self.labels()?;
                        match self.next() {
                            Some(Token {
                                kind: TokenKind::Punct('{'),
                                ..
                            }) => {}
                            Some(other) => {
                                return Err(ParseError::syntax(
                                    other.line,
                                    other.column,
                                    format!("expected '{{' or '=' after {name:?}"),
                                ));
                            }
                            None => return Err(self.eof_error("unexpected end of input")),
                        }
                        let inner = self.body(true)?;
                        body.blocks.push(Block {
                            kind: name,
                            labels,
                            body: inner,
                            line: token.line,
                            column: token.column,
                        });
                    }
                }
                other => {
                    return Err(ParseError::syntax(
                        token.line,
                        token.column,
                        format!("unexpected {}", describe(&other)),
                    ));
                }
            }
        }
    }

    fn labels(&mut self) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Ident(label) => labels.push(label.clone()),
                TokenKind::Str(segments) => match segments.as_slice() {
                    [] => labels.push(String::new()),
                    [Segment::Lit(label)] => labels.push(label.clone()),
                    _ => {
                        return Err(ParseError::syntax(
                            token.line,
                            token.column,
                            "block labels cannot contain interpolation",
                        ));
                    }
                },
                _ => break,
            }
            self.pos += 1;
        }
        Ok(labels)
    }

    /// Tokens of one attribute value: up to the end of line (or a closing
    /// brace of a one-line block) outside any brackets.
    fn expression(&mut self, line: usize, column: usize) -> Result<Vec<Token>, ParseError> {
        let mut depth = 0usize;
        let mut expr = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Newline if depth == 0 => break,
                TokenKind::Punct('}') if depth == 0 => break,
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                _ => {}
            }
            expr.push(token.clone());
            self.pos += 1;
        }
        if expr.is_empty() {
            return Err(ParseError::syntax(line, column, "expected an expression"));
        }
        Ok(expr)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("identifier {name:?}"),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Punct(c) => format!("{c:?}"),
        TokenKind::Newline => "newline".to_string(),
    }
}

// ========================================
// 評価（リテラルと var.x のみ）
// ========================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Number(String),
    Bool(bool),
    List(Vec<Value>),
    /// Anything this scanner does not evaluate.
    Unknown,
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

struct Evaluator<'a> {
    variables: &'a BTreeMap<String, Value>,
}

impl Evaluator<'_> {
    fn eval(&self, tokens: &[Token]) -> Value {
        let kinds: Vec<&TokenKind> = tokens
            .iter()
            .map(|t| &t.kind)
            .filter(|k| **k != TokenKind::Newline)
            .collect();
        match kinds.as_slice() {
            [TokenKind::Str(segments)] => self.template(segments),
            [TokenKind::Number(n)] => Value::Number(n.clone()),
            [TokenKind::Ident(word)] if word == "true" => Value::Bool(true),
            [TokenKind::Ident(word)] if word == "false" => Value::Bool(false),
            [TokenKind::Ident(root), TokenKind::Punct('.'), TokenKind::Ident(name)]
                if root == "var" =>
            {
                self.variables.get(name).cloned().unwrap_or(Value::Unknown)
            }
            [TokenKind::Punct('['), .., TokenKind::Punct(']')] => {
                let significant: Vec<Token> = tokens
                    .iter()
                    .filter(|t| t.kind != TokenKind::Newline)
                    .cloned()
                    .collect();
                let inner = &significant[1..significant.len() - 1];
                Value::List(
                    split_top_level(inner)
                        .into_iter()
                        .filter(|item| !item.is_empty())
                        .map(|item| self.eval(item))
                        .collect(),
                )
            }
            _ => Value::Unknown,
        }
    }

    fn template(&self, segments: &[Segment]) -> Value {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Lit(text) => out.push_str(text),
                Segment::Interp(raw) => {
                    let Ok(tokens) = Lexer::new(raw).tokenize() else {
                        return Value::Unknown;
                    };
                    match self.eval(&tokens) {
                        Value::Str(s) | Value::Number(s) => out.push_str(&s),
                        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
                        _ => return Value::Unknown,
                    }
                }
            }
        }
        Value::Str(out)
    }
}

fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Punct('(' | '[' | '{') => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
            TokenKind::Punct(',') if depth == 0 => {
                items.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&tokens[start..]);
    items
}

/// Declared variables with caller overrides applied.
fn resolve_variables(
    body: &Body,
    overrides: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Value>, ParseError> {
    let empty = BTreeMap::new();
    let literal = Evaluator { variables: &empty };
    let mut resolved = BTreeMap::new();
    for block in body.blocks("variable") {
        let Some(name) = block.labels.first() else {
            return Err(ParseError::syntax(
                block.line,
                block.column,
                "variable block needs a name label",
            ));
        };
        let value = match (overrides.get(name), block.body.attribute("default")) {
            (Some(value), _) => Value::Str(value.clone()),
            (None, Some(default)) => literal.eval(&default.expr),
            (None, None) => return Err(ParseError::UnsetVariable(name.clone())),
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}

fn extract_job(body: &Body, eval: &Evaluator<'_>) -> Result<ParsedJob, ParseError> {
    let mut jobs = body.blocks("job");
    let job = jobs
        .next()
        .ok_or_else(|| ParseError::NotAJob("no job block found".to_string()))?;
    if jobs.next().is_some() {
        return Err(ParseError::NotAJob("more than one job block".to_string()));
    }
    let id = job
        .labels
        .first()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParseError::syntax(job.line, job.column, "job block needs a name label"))?
        .clone();

    let string_attr = |name: &str| {
        job.body
            .attribute(name)
            .and_then(|attr| eval.eval(&attr.expr).as_str().map(str::to_string))
            .filter(|value| !value.is_empty())
    };

    let job_type = match job.body.attribute("type") {
        Some(attr) => match eval.eval(&attr.expr) {
            Value::Str(value) => JobType::parse(&value).ok_or_else(|| {
                ParseError::syntax(attr.line, attr.column, format!("invalid job type {value:?}"))
            })?,
            _ => JobType::default(),
        },
        None => JobType::default(),
    };

    let datacenters = match job.body.attribute("datacenters").map(|a| eval.eval(&a.expr)) {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let job_update = job.body.block("update").and_then(|u| max_parallel(&u.body, eval));
    let groups: Vec<&Block> = job.body.blocks("group").collect();
    let deployments_enabled = if groups.is_empty() {
        job_update.unwrap_or(1) > 0
    } else {
        groups.iter().any(|group| {
            let own = group.body.block("update").and_then(|u| max_parallel(&u.body, eval));
            own.or(job_update).unwrap_or(1) > 0
        })
    };

    let periodic = job.body.block("periodic").is_some_and(|p| {
        p.body
            .attribute("enabled")
            .map(|a| eval.eval(&a.expr) != Value::Bool(false))
            .unwrap_or(true)
    });

    Ok(ParsedJob {
        name: string_attr("name").unwrap_or_else(|| id.clone()),
        namespace: string_attr("namespace"),
        job_type,
        parameterized: job.body.block("parameterized").is_some(),
        periodic,
        multiregion: job.body.block("multiregion").is_some(),
        deployments_enabled,
        datacenters,
        task_groups: groups
            .iter()
            .filter_map(|g| g.labels.first().cloned())
            .collect(),
        payload: None,
        id,
    })
}

fn max_parallel(update: &Body, eval: &Evaluator<'_>) -> Option<u64> {
    match eval.eval(&update.attribute("max_parallel")?.expr) {
        Value::Number(n) => n.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(source: &str) -> Result<ParsedJob, ParseError> {
        HclJobspecParser::new().parse(&JobSpecification::hcl(source))
    }

    const SERVICE: &str = r#"
# web frontend
job "web" {
  datacenters = ["dc1", "dc2"]
  type        = "service"

  /* rolling updates */
  update {
    max_parallel = 1
  }

  group "frontend" {
    count = 2
    task "nginx" {
      driver = "docker"
      config {
        image = "nginx:1.25"
        args  = ["-g", "daemon off;"]
      }
      template {
        data = <<-EOT
          upstream = "${NOMAD_UPSTREAM_ADDR_api}"
          EOT
        destination = "local/upstream.conf"
      }
    }
  }
}
"#;

    #[test]
    fn service_header_is_extracted() {
        let job = parse(SERVICE).unwrap();
        assert_eq!(job.id, "web");
        assert_eq!(job.name, "web");
        assert_eq!(job.job_type, JobType::Service);
        assert_eq!(job.datacenters, vec!["dc1", "dc2"]);
        assert_eq!(job.task_groups, vec!["frontend"]);
        assert!(job.deployments_enabled);
        assert_eq!(job.namespace, None);
    }

    #[test]
    fn variables_resolve_with_overrides_and_defaults() {
        let source = r#"
variable "ns" {
  type    = string
  default = "team-a"
}
variable "dc" {}

job "api" {
  namespace   = var.ns
  datacenters = [var.dc]
  name        = "api-${var.dc}"
}
"#;
        let spec = JobSpecification::hcl(source).with_variable("dc", "eu-west");
        let job = HclJobspecParser::new().parse(&spec).unwrap();

        assert_eq!(job.namespace.as_deref(), Some("team-a"));
        assert_eq!(job.datacenters, vec!["eu-west"]);
        assert_eq!(job.name, "api-eu-west");
    }

    #[test]
    fn unset_variable_without_default_is_rejected() {
        let err = parse("variable \"dc\" {}\njob \"api\" {}\n").unwrap_err();
        assert_eq!(err, ParseError::UnsetVariable("dc".to_string()));
    }

    #[rstest]
    #[case::attribute("job \"a\" {\n  meta = { cfg = file(\"/etc/passwd\") }\n}\n")]
    #[case::interpolation("job \"a\" {\n  meta = { cfg = \"${file(\"x\")}\" }\n}\n")]
    #[case::heredoc("job \"a\" {\n  x = <<EOT\n${templatefile(\"t\", {})}\nEOT\n}\n")]
    fn filesystem_functions_need_allow_fs(#[case] source: &str) {
        let err = parse(source).unwrap_err();
        assert!(matches!(err, ParseError::FilesystemDisabled(_)), "{err:?}");

        let allowed = HclJobspecParser::new()
            .parse(&JobSpecification::hcl(source).with_allow_fs(true))
            .unwrap();
        assert_eq!(allowed.id, "a");
    }

    #[rstest]
    #[case::no_job("group \"x\" {}\n", "no job block")]
    #[case::two_jobs("job \"a\" {}\njob \"b\" {}\n", "more than one job block")]
    #[case::unclosed("job \"a\" {\n", "unclosed block")]
    #[case::unterminated_string("job \"a {}\n", "unterminated string")]
    #[case::bad_type("job \"a\" {\n  type = \"cron\"\n}\n", "invalid job type")]
    #[case::missing_label("job {}\n", "needs a name label")]
    fn malformed_jobspecs(#[case] source: &str, #[case] message: &str) {
        let err = parse(source).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn template_job_flags() {
        let source = r#"
job "dispatch" {
  type = "batch"
  parameterized {
    payload = "required"
  }
  periodic { cron = "@daily" }
}
"#;
        let job = parse(source).unwrap();
        assert!(job.parameterized);
        assert!(job.periodic);
        assert!(!job.produces_deployments());
    }

    #[test]
    fn groups_without_rolling_updates_disable_deployments() {
        let source = r#"
job "cache" {
  update { max_parallel = 0 }
  group "redis" {}
  group "memcached" {}
}
"#;
        let job = parse(source).unwrap();
        assert!(!job.deployments_enabled);
        assert!(!job.produces_deployments());
    }

    #[test]
    fn block_lookup_accepts_borrowed_kind() {
        let tokens = Lexer::new("job \"a\" {\n  update { max_parallel = 3 }\n}\n")
            .tokenize()
            .unwrap();
        let body = Parser::new(tokens).document().unwrap();
        let kind = String::from("job");

        let job = body.block(&kind).unwrap();
        let update = job.body.block("update").unwrap();
        assert_eq!(job.labels, vec!["a"]);
        assert!(update.body.attribute("max_parallel").is_some());
    }

    #[test]
    fn escaped_interpolation_is_literal() {
        let job = parse("job \"a\" {\n  name = \"$${literal}\"\n}\n").unwrap();
        assert_eq!(job.name, "${literal}");
    }
}
