//! Structural parser over logical lines.
//!
//! Validates block structure (indentation, headers ending in `:`) and
//! collects top-level class definitions with their methods and annotated
//! fields. Statement bodies are otherwise not interpreted.

use super::lexer::{find_top_level, logical_lines, split_top_level, unparsable, LogicalLine};
use crate::error::HarnessResult;

/// Keywords that open a compound statement.
const COMPOUND_KEYWORDS: &[&str] = &[
    "class", "def", "async", "if", "elif", "else", "for", "while", "try", "except", "finally",
    "with", "match", "case",
];

/// Reserved words that cannot name a class, function or parameter.
const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// How a parameter binds arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Positional (or positional-or-keyword).
    Positional,
    /// After a bare `*` or `*args`.
    KeywordOnly,
    /// `*args`.
    VarArgs,
    /// `**kwargs`.
    VarKeywords,
}

/// A parameter exactly as written in a `def` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParam {
    /// Parameter name.
    pub name: String,
    /// Annotation text, if any.
    pub annotation: Option<String>,
    /// Default expression text, if any.
    pub default: Option<String>,
    /// Binding kind.
    pub kind: ParamKind,
}

/// A `def` inside a class body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// Parameters, including `self`/`cls`.
    pub params: Vec<RawParam>,
    /// Return annotation text.
    pub returns: Option<String>,
    /// Decorator expressions without the `@`.
    pub decorators: Vec<String>,
    /// Line of the `def`.
    pub line: usize,
}

/// An annotated class attribute (`name: T = default`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Attribute name.
    pub name: String,
    /// Annotation text.
    pub annotation: String,
    /// Default expression text, if any.
    pub default: Option<String>,
}

/// A top-level class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Class name.
    pub name: String,
    /// Base class expressions.
    pub bases: Vec<String>,
    /// Decorator expressions without the `@`.
    pub decorators: Vec<String>,
    /// Methods defined directly in the body.
    pub methods: Vec<FunctionDef>,
    /// Annotated attributes defined directly in the body.
    pub fields: Vec<FieldDef>,
    /// Line of the `class` header.
    pub line: usize,
}

impl ClassDef {
    /// Find a method defined directly on this class.
    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Whether the class carries a `@dataclass` decorator.
    pub fn is_dataclass(&self) -> bool {
        self.decorators
            .iter()
            .any(|d| d.split('(').next().unwrap_or(d).ends_with("dataclass"))
    }
}

/// Parsed module: the top-level classes in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    /// Top-level classes.
    pub classes: Vec<ClassDef>,
}

impl Module {
    /// Find a top-level class by name.
    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// Parse source text into a [`Module`].
pub fn parse_module(source: &str) -> HarnessResult<Module> {
    let lines = logical_lines(source)?;
    check_blocks(&lines)?;

    let mut module = Module::default();
    let mut decorators = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if line.indent != 0 {
            i += 1;
            continue;
        }
        if let Some(deco) = line.text.strip_prefix('@') {
            decorators.push(deco.trim().to_string());
            i += 1;
            continue;
        }
        if keyword_of(&line.text) == Some("class") {
            let (mut class, body_end) = parse_class_header(&lines, i)?;
            class.decorators = std::mem::take(&mut decorators);
            collect_body(&lines[i + 1..body_end], &mut class)?;
            module.classes.push(class);
            i = body_end;
            continue;
        }
        decorators.clear();
        i += 1;
    }
    Ok(module)
}

/// Validate indentation and compound-statement headers.
fn check_blocks(lines: &[LogicalLine]) -> HarnessResult<()> {
    let mut stack = vec![0usize];
    let mut expect_block: Option<usize> = None;

    for line in lines {
        let top = stack.last().copied().unwrap_or(0);
        if let Some(opener) = expect_block.take() {
            if line.indent <= top {
                return Err(unparsable(
                    line.line,
                    &format!("expected an indented block after line {opener}"),
                ));
            }
            stack.push(line.indent);
        } else if line.indent > top {
            return Err(unparsable(line.line, "unexpected indent"));
        } else {
            while stack.last().copied().unwrap_or(0) > line.indent {
                stack.pop();
            }
            if stack.last().copied().unwrap_or(0) != line.indent {
                return Err(unparsable(
                    line.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        if opens_block(line)? {
            expect_block = Some(line.line);
        }
    }

    if let Some(opener) = expect_block {
        return Err(unparsable(
            opener,
            &format!("expected an indented block after line {opener}"),
        ));
    }
    Ok(())
}

/// Whether a logical line is a compound header with its body on later lines.
fn opens_block(line: &LogicalLine) -> HarnessResult<bool> {
    let Some(keyword) = keyword_of(&line.text) else {
        return Ok(false);
    };
    if matches!(keyword, "match" | "case") && !line.text.ends_with(':') {
        // Soft keywords: `match = 3` is an ordinary assignment.
        return Ok(false);
    }

    let colon = match keyword {
        "def" | "async" if is_def(&line.text) => parse_function_header(&line.text, line.line)?.1,
        "class" => parse_class_signature(&line.text, line.line)?.2,
        _ => find_top_level(&line.text, ':')
            .ok_or_else(|| unparsable(line.line, &format!("expected ':' after '{keyword}'")))?,
    };
    Ok(line.text[colon + 1..].trim().is_empty())
}

/// Whether a logical line is a `def` or `async def` header.
fn is_def(text: &str) -> bool {
    match keyword_of(text) {
        Some("def") => true,
        Some("async") => text["async".len()..].trim_start().starts_with("def"),
        _ => false,
    }
}

/// Leading keyword of a statement, if it is a compound keyword.
fn keyword_of(text: &str) -> Option<&'static str> {
    let word: String = text
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let rest = &text[word.len()..];
    let follows_ok = rest.is_empty() || rest.starts_with([' ', ':', '(', '\t']);
    if !follows_ok {
        return None;
    }
    COMPOUND_KEYWORDS.iter().copied().find(|k| *k == word)
}

fn parse_class_header(lines: &[LogicalLine], index: usize) -> HarnessResult<(ClassDef, usize)> {
    let header = &lines[index];
    let (name, bases, _) = parse_class_signature(&header.text, header.line)?;
    let body_end = lines[index + 1..]
        .iter()
        .position(|l| l.indent <= header.indent)
        .map_or(lines.len(), |p| index + 1 + p);

    Ok((
        ClassDef {
            name,
            bases,
            decorators: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            line: header.line,
        },
        body_end,
    ))
}

/// Parse `class Name(bases):`, returning name, bases and the header colon offset.
fn parse_class_signature(text: &str, line: usize) -> HarnessResult<(String, Vec<String>, usize)> {
    let rest = text
        .strip_prefix("class")
        .ok_or_else(|| unparsable(line, "invalid class definition"))?;
    let name_len = rest.trim_start().chars().take_while(|c| c.is_alphanumeric() || *c == '_').count();
    let lead = rest.len() - rest.trim_start().len();
    let name: String = rest.trim_start().chars().take(name_len).collect();
    if !is_identifier(&name) {
        return Err(unparsable(line, "invalid class name"));
    }

    let mut offset = "class".len() + lead + name.len();
    let after = &text[offset..];
    let mut bases = Vec::new();
    let trimmed = after.trim_start();
    offset += after.len() - trimmed.len();
    if trimmed.starts_with('(') {
        let close = matching_paren(trimmed).ok_or_else(|| unparsable(line, "invalid class bases"))?;
        bases = split_top_level(&trimmed[1..close], ',')
            .into_iter()
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.contains('='))
            .map(str::to_string)
            .collect();
        offset += close + 1;
    }
    let tail = &text[offset..];
    let colon_rel = tail
        .find(|c: char| !c.is_whitespace())
        .filter(|&p| tail[p..].starts_with(':'))
        .ok_or_else(|| unparsable(line, "expected ':' after class header"))?;
    Ok((name, bases, offset + colon_rel))
}

/// Parse a `def` header, returning the function and the header colon offset.
fn parse_function_header(text: &str, line: usize) -> HarnessResult<(FunctionDef, usize)> {
    let (prefix_len, rest) = match text.strip_prefix("async") {
        Some(r) => {
            let r2 = r.trim_start();
            let skipped = text.len() - r2.len();
            let r3 = r2
                .strip_prefix("def")
                .ok_or_else(|| unparsable(line, "expected 'def' after 'async'"))?;
            (skipped + 3, r3)
        }
        None => (
            3,
            text.strip_prefix("def")
                .ok_or_else(|| unparsable(line, "invalid function definition"))?,
        ),
    };

    let trimmed = rest.trim_start();
    let lead = rest.len() - trimmed.len();
    let name: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if !is_identifier(&name) {
        return Err(unparsable(line, "invalid function name"));
    }

    let after_name = &trimmed[name.len()..];
    let paren_rel = after_name
        .find(|c: char| !c.is_whitespace())
        .filter(|&p| after_name[p..].starts_with('('))
        .ok_or_else(|| unparsable(line, "expected '(' after function name"))?;
    let params_start = prefix_len + lead + name.len() + paren_rel;
    let close = matching_paren(&text[params_start..])
        .ok_or_else(|| unparsable(line, "unbalanced parameter list"))?;
    let params = parse_params(&text[params_start + 1..params_start + close], line)?;

    let tail_start = params_start + close + 1;
    let tail = &text[tail_start..];
    let colon = find_top_level(tail, ':')
        .ok_or_else(|| unparsable(line, "expected ':' after function header"))?;
    let between = tail[..colon].trim();
    let returns = if between.is_empty() {
        None
    } else {
        let ann = between
            .strip_prefix("->")
            .ok_or_else(|| unparsable(line, "invalid syntax in function header"))?
            .trim();
        if ann.is_empty() {
            return Err(unparsable(line, "missing return annotation after '->'"));
        }
        Some(ann.to_string())
    };

    Ok((
        FunctionDef {
            name,
            params,
            returns,
            decorators: Vec::new(),
            line,
        },
        tail_start + colon,
    ))
}

fn parse_params(text: &str, line: usize) -> HarnessResult<Vec<RawParam>> {
    let mut params = Vec::new();
    let mut keyword_only = false;
    let pieces = split_top_level(text, ',');
    let count = pieces.len();

    for (idx, piece) in pieces.into_iter().enumerate() {
        let piece = piece.trim();
        if piece.is_empty() {
            if idx + 1 == count && idx > 0 {
                continue;
            }
            if count == 1 {
                continue;
            }
            return Err(unparsable(line, "invalid syntax in parameter list"));
        }
        if piece == "/" {
            continue;
        }
        if piece == "*" {
            keyword_only = true;
            continue;
        }

        let (kind, body) = if let Some(b) = piece.strip_prefix("**") {
            (ParamKind::VarKeywords, b)
        } else if let Some(b) = piece.strip_prefix('*') {
            keyword_only = true;
            (ParamKind::VarArgs, b)
        } else if keyword_only {
            (ParamKind::KeywordOnly, piece)
        } else {
            (ParamKind::Positional, piece)
        };

        let (head, default) = match find_top_level(body, '=') {
            Some(eq) => (&body[..eq], Some(body[eq + 1..].trim().to_string())),
            None => (body, None),
        };
        let (name, annotation) = match find_top_level(head, ':') {
            Some(colon) => (
                head[..colon].trim(),
                Some(head[colon + 1..].trim().to_string()),
            ),
            None => (head.trim(), None),
        };
        if !is_identifier(name) {
            return Err(unparsable(line, &format!("invalid parameter '{piece}'")));
        }
        if default.as_deref() == Some("") || annotation.as_deref() == Some("") {
            return Err(unparsable(line, &format!("incomplete parameter '{piece}'")));
        }
        params.push(RawParam {
            name: name.to_string(),
            annotation,
            default,
            kind,
        });
    }
    Ok(params)
}

/// Collect methods and fields from the lines of a class body.
fn collect_body(body: &[LogicalLine], class: &mut ClassDef) -> HarnessResult<()> {
    let Some(first) = body.first() else {
        return Ok(());
    };
    let member_indent = first.indent;
    let mut decorators = Vec::new();

    for line in body.iter().filter(|l| l.indent == member_indent) {
        if let Some(deco) = line.text.strip_prefix('@') {
            decorators.push(deco.trim().to_string());
            continue;
        }
        match keyword_of(&line.text) {
            Some(_) if is_def(&line.text) => {
                let (mut func, _) = parse_function_header(&line.text, line.line)?;
                func.decorators = std::mem::take(&mut decorators);
                class.methods.push(func);
            }
            Some(_) => decorators.clear(),
            None => {
                decorators.clear();
                if let Some(field) = parse_field(&line.text) {
                    class.fields.push(field);
                }
            }
        }
    }
    Ok(())
}

fn parse_field(text: &str) -> Option<FieldDef> {
    let colon = find_top_level(text, ':')?;
    let name = text[..colon].trim();
    if !is_identifier(name) {
        return None;
    }
    let rest = &text[colon + 1..];
    let (annotation, default) = match find_top_level(rest, '=') {
        Some(eq) => (rest[..eq].trim(), Some(rest[eq + 1..].trim().to_string())),
        None => (rest.trim(), None),
    };
    if annotation.is_empty() || annotation.starts_with("ClassVar") || annotation.contains(".ClassVar") {
        return None;
    }
    Some(FieldDef {
        name: name.to_string(),
        annotation: annotation.to_string(),
        default,
    })
}

/// Offset of the `)` matching the `(` at offset 0.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
    head_ok && chars.all(|c| c.is_alphanumeric() || c == '_') && !RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    const COUNTER: &str = r#"
class Counter:
    """A counter."""

    def __init__(self, start: int = 0, *, step=1):
        self.value = start

    @property
    def current(self) -> int:
        return self.value

    def increment(self) -> int:
        self.value += 1
        return self.value

    def add(self, a, b: float = 0.5) -> float: return a + b
"#;

    fn line_of(err: HarnessError) -> usize {
        match err {
            HarnessError::UnparsableSource { line, .. } => line,
            other => panic!("expected UnparsableSource, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_counter_class() {
        let module = parse_module(COUNTER).unwrap();
        assert_eq!(module.classes.len(), 1);
        let class = &module.classes[0];
        assert_eq!(class.name, "Counter");
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["__init__", "current", "increment", "add"]);

        let init = class.method("__init__").unwrap();
        assert_eq!(init.params.len(), 3);
        assert_eq!(init.params[1].annotation.as_deref(), Some("int"));
        assert_eq!(init.params[1].default.as_deref(), Some("0"));
        assert_eq!(init.params[2].kind, ParamKind::KeywordOnly);

        let current = class.method("current").unwrap();
        assert_eq!(current.decorators, vec!["property".to_string()]);
        assert_eq!(current.returns.as_deref(), Some("int"));

        let add = class.method("add").unwrap();
        assert_eq!(add.returns.as_deref(), Some("float"));
    }

    #[test]
    fn test_class_bases_and_decorators() {
        let src = "from dataclasses import dataclass\n\n@dataclass\nclass Point(Base, metaclass=Meta):\n    x: int\n    y: float = 0.0\n";
        let module = parse_module(src).unwrap();
        let class = module.class("Point").unwrap();
        assert_eq!(class.bases, vec!["Base".to_string()]);
        assert!(class.is_dataclass());
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.fields[1].default.as_deref(), Some("0.0"));
    }

    #[test]
    fn test_missing_colon_rejected() {
        let err = parse_module("class A:\n    def f(self)\n        return 1\n").unwrap_err();
        assert_eq!(line_of(err), 2);
    }

    #[test]
    fn test_unexpected_indent_rejected() {
        let err = parse_module("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(line_of(err), 2);
    }

    #[test]
    fn test_bad_dedent_rejected() {
        let err = parse_module("class A:\n    def f(self):\n        return 1\n  x = 2\n").unwrap_err();
        assert_eq!(line_of(err), 4);
    }

    #[test]
    fn test_missing_block_rejected() {
        let err = parse_module("class A:\n    def f(self):\n").unwrap_err();
        assert_eq!(line_of(err), 2);
    }

    #[test]
    fn test_reserved_parameter_rejected() {
        assert!(parse_module("class A:\n    def f(self, class):\n        pass\n").is_err());
    }

    #[test]
    fn test_inline_bodies_accepted() {
        let module = parse_module("class A: pass\nclass B:\n    def f(self): return 1\n").unwrap();
        assert_eq!(module.classes.len(), 2);
        assert!(module.classes[0].methods.is_empty());
        assert_eq!(module.classes[1].methods.len(), 1);
    }

    #[test]
    fn test_nested_blocks_and_soft_keywords() {
        let src = "class A:\n    def f(self, x):\n        match = x\n        if x:\n            for i in range(3):\n                pass\n        else:\n            return {1: 2}\n        return match\n";
        assert!(parse_module(src).is_ok());
    }

    #[test]
    fn test_varargs_params() {
        let module = parse_module("class A:\n    def f(self, a, /, b, *args, c=1, **kw):\n        pass\n").unwrap();
        let params = &module.classes[0].methods[0].params;
        let kinds: Vec<ParamKind> = params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::Positional,
                ParamKind::Positional,
                ParamKind::Positional,
                ParamKind::VarArgs,
                ParamKind::KeywordOnly,
                ParamKind::VarKeywords,
            ]
        );
    }
}
