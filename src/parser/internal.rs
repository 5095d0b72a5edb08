//! The in-process spec compiler.
//!
//! A recursive-descent parser over the token stream, resolving type
//! references as it goes: a bare identifier names a typedef declared
//! earlier in the same module, `Module.Type` names a typedef of an
//! included module. Resolution embeds a deep copy of the referenced
//! definition, so the produced AST (and every parse record cut from it)
//! is self-contained.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::ast::{
    Component, Funcdef, Module, Parameter, Scalar, ScalarKind, Service, StructItem, StructType,
    Type, Typedef,
};

use super::errors::{SpecParseError, SpecParseResult};
use super::include::parse_include_path;
use super::lexer::{tokenize, Token, TokenKind};
use super::schema_gen;
use super::{CompileOutput, SpecParser};

/// Spec compiler backed by the built-in parser.
#[derive(Debug, Default)]
pub struct InternalParser;

impl InternalParser {
    pub fn new() -> Self {
        Self
    }
}

impl SpecParser for InternalParser {
    fn compile(
        &self,
        spec: &str,
        includes: &BTreeMap<String, String>,
        _work_dir: Option<&Path>,
    ) -> SpecParseResult<CompileOutput> {
        let mut env: HashMap<String, HashMap<String, Typedef>> = HashMap::new();
        let (direct_includes, body, body_line) = split_header(spec)?;
        let mut in_progress = HashSet::new();
        for dep in &direct_includes {
            compile_included(dep, includes, &mut env, &mut in_progress)?;
        }
        let visible: HashSet<String> = direct_includes.into_iter().collect();
        let modules = parse_modules(&body, body_line, &visible, &env)?;

        let mut schemas: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for module in &modules {
            let docs = module
                .typedefs()
                .map(|td| (td.name.clone(), schema_gen::schema_document(td)))
                .collect();
            schemas.insert(module.name.clone(), docs);
        }
        let service_name = modules
            .first()
            .map(|m| m.name.clone())
            .unwrap_or_default();
        Ok(CompileOutput {
            services: vec![Service {
                name: service_name,
                modules,
            }],
            schemas,
        })
    }
}

/// Compile one included module (and, first, its own includes) into `env`.
fn compile_included(
    name: &str,
    includes: &BTreeMap<String, String>,
    env: &mut HashMap<String, HashMap<String, Typedef>>,
    in_progress: &mut HashSet<String>,
) -> SpecParseResult<()> {
    if env.contains_key(name) {
        return Ok(());
    }
    if !in_progress.insert(name.to_string()) {
        return Err(SpecParseError::CyclicInclude(name.to_string()));
    }
    let spec = includes
        .get(name)
        .ok_or_else(|| SpecParseError::MissingInclude(name.to_string()))?;
    let (direct_includes, body, body_line) = split_header(spec)?;
    for dep in &direct_includes {
        compile_included(dep, includes, env, in_progress)?;
    }
    let visible: HashSet<String> = direct_includes.into_iter().collect();
    let modules = parse_modules(&body, body_line, &visible, env)?;
    let declared: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    if !declared.contains(&name) {
        return Err(SpecParseError::Internal(format!(
            "included file for module {name} declares module(s) {declared:?}"
        )));
    }
    for module in modules {
        let table = module
            .typedefs()
            .map(|td| (td.name.clone(), td.clone()))
            .collect();
        env.insert(module.name.clone(), table);
    }
    in_progress.remove(name);
    Ok(())
}

/// Split a spec into (direct includes, body text, 1-based body line).
fn split_header(spec: &str) -> SpecParseResult<(Vec<String>, String, usize)> {
    let mut includes = Vec::new();
    let mut body = String::new();
    let mut body_line = 1;
    let mut in_header = true;
    for (idx, line) in spec.lines().enumerate() {
        if in_header {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("#include") {
                includes.push(parse_include_path(rest)?);
                continue;
            }
            in_header = false;
            body_line = idx + 1;
        }
        body.push_str(line);
        body.push('\n');
    }
    Ok((includes, body, body_line))
}

fn parse_modules(
    body: &str,
    first_line: usize,
    visible: &HashSet<String>,
    env: &HashMap<String, HashMap<String, Typedef>>,
) -> SpecParseResult<Vec<Module>> {
    let tokens = tokenize(body, first_line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        visible,
        env,
    };
    let mut modules = Vec::new();
    while !parser.at_end() {
        modules.push(parser.parse_module()?);
    }
    if modules.is_empty() {
        return Err(SpecParseError::Syntax {
            line: first_line,
            message: "spec contains no module".into(),
        });
    }
    Ok(modules)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    visible: &'a HashSet<String>,
    env: &'a HashMap<String, HashMap<String, Typedef>>,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> SpecParseResult<Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| SpecParseError::Syntax {
                line: self.last_line(),
                message: "unexpected end of file".into(),
            })?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> SpecParseResult<Token> {
        let tok = self.next()?;
        if tok.kind != kind {
            return Err(SpecParseError::Syntax {
                line: tok.line,
                message: format!("expected {what}, found {:?}", tok.kind),
            });
        }
        Ok(tok)
    }

    fn expect_ident(&mut self, what: &str) -> SpecParseResult<(String, usize)> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Ident(text) => Ok((text, tok.line)),
            other => Err(SpecParseError::Syntax {
                line: tok.line,
                message: format!("expected {what}, found {other:?}"),
            }),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> SpecParseResult<usize> {
        let (text, line) = self.expect_ident(&format!("'{keyword}'"))?;
        if text != keyword {
            return Err(SpecParseError::Syntax {
                line,
                message: format!("expected '{keyword}', found '{text}'"),
            });
        }
        Ok(line)
    }

    /// Consume consecutive comment tokens, returning the last one.
    fn take_comment(&mut self) -> Option<String> {
        let mut comment = None;
        while let Some(Token {
            kind: TokenKind::Comment(text),
            ..
        }) = self.peek()
        {
            comment = Some(text.clone());
            self.pos += 1;
        }
        comment
    }

    fn parse_module(&mut self) -> SpecParseResult<Module> {
        let comment = self.take_comment().unwrap_or_default();
        self.expect_keyword("module")?;
        let (name, _) = self.expect_ident("module name")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut locals: HashMap<String, Typedef> = HashMap::new();
        let mut components = Vec::new();
        loop {
            if let Some(Token {
                kind: TokenKind::RBrace,
                ..
            }) = self.peek()
            {
                self.pos += 1;
                break;
            }
            components.push(self.parse_component(&name, &mut locals)?);
        }
        self.expect(TokenKind::Semi, "';' after module body")?;
        Ok(Module {
            name,
            comment: tidy_comment(&comment),
            components,
        })
    }

    fn parse_component(
        &mut self,
        module: &str,
        locals: &mut HashMap<String, Typedef>,
    ) -> SpecParseResult<Component> {
        let comment = self.take_comment().unwrap_or_default();
        let (keyword, line) = self.expect_ident("'typedef' or 'funcdef'")?;
        match keyword.as_str() {
            "typedef" => {
                let mut alias_type = self.parse_type(module, locals)?;
                let (name, _) = self.expect_ident("type name")?;
                self.expect(TokenKind::Semi, "';' after typedef")?;
                if let Some(id_ref) = extract_id_annotation(&comment) {
                    if let Type::Scalar(scalar) = &mut alias_type {
                        scalar.id_reference = Some(id_ref);
                    }
                }
                let typedef = Typedef {
                    module: module.to_string(),
                    name: name.clone(),
                    comment: tidy_comment(&comment),
                    alias_type,
                };
                if locals.insert(name.clone(), typedef.clone()).is_some() {
                    return Err(SpecParseError::DuplicateDefinition(format!(
                        "{module}.{name}"
                    )));
                }
                Ok(Component::Typedef(typedef))
            }
            "funcdef" => {
                let (name, _) = self.expect_ident("function name")?;
                self.expect(TokenKind::LParen, "'('")?;
                let parameters = self.parse_parameters(module, locals)?;
                self.expect_keyword("returns")?;
                self.expect(TokenKind::LParen, "'('")?;
                let returns = self.parse_parameters(module, locals)?;
                self.expect(TokenKind::Semi, "';' after funcdef")?;
                Ok(Component::Funcdef(Funcdef {
                    name,
                    comment: tidy_comment(&comment),
                    parameters,
                    returns,
                }))
            }
            other => Err(SpecParseError::Syntax {
                line,
                message: format!("expected 'typedef' or 'funcdef', found '{other}'"),
            }),
        }
    }

    /// Parse a parameter list up to and including the closing ')'.
    fn parse_parameters(
        &mut self,
        module: &str,
        locals: &HashMap<String, Typedef>,
    ) -> SpecParseResult<Vec<Parameter>> {
        let mut params = Vec::new();
        if let Some(Token {
            kind: TokenKind::RParen,
            ..
        }) = self.peek()
        {
            self.pos += 1;
            return Ok(params);
        }
        loop {
            let param_type = self.parse_type(module, locals)?;
            let name = match self.peek() {
                Some(Token {
                    kind: TokenKind::Ident(_),
                    ..
                }) => Some(self.expect_ident("parameter name")?.0),
                _ => None,
            };
            params.push(Parameter { name, param_type });
            let tok = self.next()?;
            match tok.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => break,
                other => {
                    return Err(SpecParseError::Syntax {
                        line: tok.line,
                        message: format!("expected ',' or ')', found {other:?}"),
                    })
                }
            }
        }
        Ok(params)
    }

    fn parse_type(
        &mut self,
        module: &str,
        locals: &HashMap<String, Typedef>,
    ) -> SpecParseResult<Type> {
        let (head, line) = self.expect_ident("a type")?;
        match head.as_str() {
            "int" => Ok(Type::Scalar(Scalar::new(ScalarKind::Int))),
            "float" => Ok(Type::Scalar(Scalar::new(ScalarKind::Float))),
            "string" => Ok(Type::Scalar(Scalar::new(ScalarKind::String))),
            "UnspecifiedObject" => Ok(Type::UnspecifiedObject),
            "list" => {
                self.expect(TokenKind::LAngle, "'<'")?;
                let elem = self.parse_type(module, locals)?;
                self.expect(TokenKind::RAngle, "'>'")?;
                Ok(Type::List(Box::new(elem)))
            }
            "mapping" => {
                self.expect(TokenKind::LAngle, "'<'")?;
                let key = self.parse_type(module, locals)?;
                self.expect(TokenKind::Comma, "','")?;
                let value = self.parse_type(module, locals)?;
                self.expect(TokenKind::RAngle, "'>'")?;
                Ok(Type::Mapping {
                    key: Box::new(key),
                    value: Box::new(value),
                })
            }
            "tuple" => {
                self.expect(TokenKind::LAngle, "'<'")?;
                let mut elems = vec![self.parse_type(module, locals)?];
                loop {
                    let tok = self.next()?;
                    match tok.kind {
                        TokenKind::Comma => elems.push(self.parse_type(module, locals)?),
                        TokenKind::RAngle => break,
                        other => {
                            return Err(SpecParseError::Syntax {
                                line: tok.line,
                                message: format!("expected ',' or '>', found {other:?}"),
                            })
                        }
                    }
                }
                Ok(Type::Tuple(elems))
            }
            "structure" => {
                self.expect(TokenKind::LBrace, "'{'")?;
                let mut items = Vec::new();
                loop {
                    if let Some(Token {
                        kind: TokenKind::RBrace,
                        ..
                    }) = self.peek()
                    {
                        self.pos += 1;
                        break;
                    }
                    items.push(self.parse_struct_item(module, locals)?);
                }
                Ok(Type::Struct(StructType { items }))
            }
            _ => self.parse_reference(head, line, module, locals),
        }
    }

    fn parse_struct_item(
        &mut self,
        module: &str,
        locals: &HashMap<String, Typedef>,
    ) -> SpecParseResult<StructItem> {
        let comment = self.take_comment().unwrap_or_default();
        let mut optional = false;
        if let Some(Token {
            kind: TokenKind::Ident(word),
            ..
        }) = self.peek()
        {
            if word == "optional" {
                optional = true;
                self.pos += 1;
            }
        }
        let mut item_type = self.parse_type(module, locals)?;
        let (name, _) = self.expect_ident("field name")?;
        self.expect(TokenKind::Semi, "';' after struct field")?;
        if let Some(id_ref) = extract_id_annotation(&comment) {
            if let Type::Scalar(scalar) = &mut item_type {
                scalar.id_reference = Some(id_ref);
            }
        }
        Ok(StructItem {
            name,
            item_type,
            optional,
        })
    }

    /// Resolve a type reference: `Name` against local typedefs,
    /// `Module.Name` against an included module.
    fn parse_reference(
        &mut self,
        head: String,
        line: usize,
        module: &str,
        locals: &HashMap<String, Typedef>,
    ) -> SpecParseResult<Type> {
        if let Some(Token {
            kind: TokenKind::Dot,
            ..
        }) = self.peek()
        {
            self.pos += 1;
            let (type_name, line) = self.expect_ident("type name after '.'")?;
            let full = format!("{head}.{type_name}");
            if !self.visible.contains(&head) {
                return Err(SpecParseError::UnknownType { line, name: full });
            }
            let table = self
                .env
                .get(&head)
                .ok_or_else(|| SpecParseError::MissingInclude(head.clone()))?;
            let typedef = table
                .get(&type_name)
                .ok_or(SpecParseError::UnknownType { line, name: full })?;
            return Ok(Type::Typedef(Box::new(typedef.clone())));
        }
        let typedef = locals.get(&head).ok_or(SpecParseError::UnknownType {
            line,
            name: format!("{module}.{head}"),
        })?;
        Ok(Type::Typedef(Box::new(typedef.clone())))
    }
}

/// Trim comment text line-by-line, dropping leading comment decoration.
fn tidy_comment(comment: &str) -> String {
    comment
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract `@id <text>` annotation text from a comment, when present.
fn extract_id_annotation(comment: &str) -> Option<String> {
    for line in comment.lines() {
        let line = line.trim().trim_start_matches('*').trim();
        if let Some(rest) = line.strip_prefix("@id") {
            let text = rest.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}
