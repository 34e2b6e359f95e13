//! EBNF grammar recognizer.
//!
//! Grammar text is lexed and parsed into plain BNF productions over byte
//! classes, then recognized incrementally with an Earley parser (one item
//! set per pushed byte, nullable rules handled at prediction time).
//!
//! Supported syntax:
//! - `name ::= expr`, one rule per line start
//! - String literals with escapes (`\n`, `\t`, `\xHH`, `\uXXXX`, ...)
//! - Character classes `[a-z]`, `[^"\\]`
//! - Grouping `( ... )`, choices `|`
//! - Quantifiers `*`, `+`, `?`, `{n}`, `{n,}`, `{n,m}`
//! - Comments: `#` to end of line
//!
//! The start rule is `root` if defined, otherwise the first rule.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::constraint::Recognizer;
use crate::error::{ControllerError, Result};

// ─── Byte classes ────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
struct ByteClass([u64; 4]);

impl ByteClass {
    fn single(b: u8) -> Self {
        let mut c = Self::default();
        c.add(b);
        c
    }

    fn range(lo: u8, hi: u8) -> Self {
        let mut c = Self::default();
        for b in lo..=hi {
            c.add(b);
        }
        c
    }

    fn add(&mut self, b: u8) {
        self.0[(b >> 6) as usize] |= 1 << (b & 63);
    }

    fn has(&self, b: u8) -> bool {
        self.0[(b >> 6) as usize] & (1 << (b & 63)) != 0
    }

    fn union(&mut self, other: &ByteClass) {
        for (w, o) in self.0.iter_mut().zip(other.0.iter()) {
            *w |= o;
        }
    }

    fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }
}

impl std::fmt::Debug for ByteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for b in 0..=255u8 {
            if self.has(b) {
                write!(f, "{}", std::ascii::escape_default(b))?;
            }
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Sym {
    Rule(usize),
    Bytes(ByteClass),
}

type Alternatives = Vec<Vec<Sym>>;

// ─── Lexer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    RuleName(String),
    Ident(String),
    Literal(Vec<u8>),
    Class { negated: bool, items: Vec<(u32, u32)> },
    Int(u32),
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Pipe,
    Star,
    Plus,
    Question,
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
    col: usize,
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

fn is_name_char(c: u8, first: bool) -> bool {
    c == b'_' || c == b'-' || c == b'.' || c.is_ascii_alphabetic() || (!first && c.is_ascii_digit())
}

fn hex_digits(data: &[u8], n: usize) -> Option<u32> {
    if data.len() < n {
        return None;
    }
    let s = std::str::from_utf8(&data[..n]).ok()?;
    u32::from_str_radix(s, 16).ok()
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, delta: usize) -> Option<u8> {
        self.input.get(self.pos + delta).copied()
    }

    fn advance(&mut self) {
        if let Some(b) = self.peek() {
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn err(&self, msg: &str) -> ControllerError {
        ControllerError::Constraint(format!(
            "grammar error at line {}, column {}: {}",
            self.line, self.col, msg
        ))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.advance(),
                b'#' => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// One character or escape sequence, as a codepoint.
    fn next_char(&mut self) -> Result<u32> {
        let input: &'a [u8] = self.input;
        let rest = &input[self.pos..];
        if rest.first() == Some(&b'\\') {
            let (cp, len) = match rest.get(1) {
                Some(b'n') => (0x0A, 2),
                Some(b'r') => (0x0D, 2),
                Some(b't') => (0x09, 2),
                Some(b'0') => (0x00, 2),
                Some(b'x') => (hex_digits(&rest[2..], 2).ok_or_else(|| self.err("bad \\x escape"))?, 4),
                Some(b'u') => (hex_digits(&rest[2..], 4).ok_or_else(|| self.err("bad \\u escape"))?, 6),
                Some(&c) if c.is_ascii_punctuation() => (c as u32, 2),
                _ => return Err(self.err("invalid escape sequence")),
            };
            self.advance_n(len);
            return Ok(cp);
        }
        let end = rest.len().min(4);
        let s = match std::str::from_utf8(&rest[..end]) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap_or(""),
        };
        let c = s.chars().next().ok_or_else(|| self.err("invalid UTF-8"))?;
        self.advance_n(c.len_utf8());
        Ok(c as u32)
    }

    fn lex_literal(&mut self) -> Result<Tok> {
        self.advance();
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.err("unterminated string literal")),
                Some(b'"') => break,
                _ => {
                    let cp = self.next_char()?;
                    let c = char::from_u32(cp).ok_or_else(|| self.err("invalid codepoint"))?;
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        self.advance();
        Ok(Tok::Literal(bytes))
    }

    fn lex_class(&mut self) -> Result<Tok> {
        self.advance();
        let negated = self.peek() == Some(b'^');
        if negated {
            self.advance();
        }
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.err("unterminated character class")),
                Some(b']') => break,
                _ => {
                    let lo = self.next_char()?;
                    if self.peek() == Some(b'-') && !matches!(self.peek_at(1), Some(b']') | None) {
                        self.advance();
                        let hi = self.next_char()?;
                        if hi < lo {
                            return Err(self.err("character range out of order"));
                        }
                        items.push((lo, hi));
                    } else {
                        items.push((lo, lo));
                    }
                }
            }
        }
        self.advance();
        Ok(Tok::Class { negated, items })
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let (line, col) = (self.line, self.col);
            let tok = match self.peek() {
                None => Tok::Eof,
                Some(b'"') => self.lex_literal()?,
                Some(b'[') => self.lex_class()?,
                Some(b':') if self.peek_at(1) == Some(b':') && self.peek_at(2) == Some(b'=') => {
                    self.advance_n(3);
                    Tok::Assign
                }
                Some(c) if c.is_ascii_digit() => {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.advance();
                    }
                    let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
                    Tok::Int(text.parse().map_err(|_| self.err("integer too large"))?)
                }
                Some(c) if is_name_char(c, true) => {
                    let start = self.pos;
                    let mut first = true;
                    while self.peek().is_some_and(|c| is_name_char(c, first)) {
                        self.advance();
                        first = false;
                    }
                    Tok::Ident(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
                }
                Some(c) => {
                    let tok = match c {
                        b'(' => Tok::LParen,
                        b')' => Tok::RParen,
                        b'{' => Tok::LBrace,
                        b'}' => Tok::RBrace,
                        b',' => Tok::Comma,
                        b'|' => Tok::Pipe,
                        b'*' => Tok::Star,
                        b'+' => Tok::Plus,
                        b'?' => Tok::Question,
                        _ => return Err(self.err(&format!("unexpected character {:?}", c as char))),
                    };
                    self.advance();
                    tok
                }
            };
            let eof = tok == Tok::Eof;
            out.push(Spanned { tok, line, col });
            if eof {
                break;
            }
        }

        // An identifier followed by `::=` starts a rule.
        for i in 1..out.len() {
            if out[i].tok == Tok::Assign {
                match &out[i - 1].tok {
                    Tok::Ident(name) => out[i - 1].tok = Tok::RuleName(name.clone()),
                    _ => {
                        return Err(ControllerError::Constraint(format!(
                            "grammar error at line {}, column {}: ::= must follow a rule name",
                            out[i].line, out[i].col
                        )))
                    }
                }
            }
        }
        Ok(out)
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    names: FxHashMap<String, usize>,
    rules: Vec<Alternatives>,
    rule_names: Vec<String>,
    current: String,
    aux_counter: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            names: FxHashMap::default(),
            rules: Vec::new(),
            rule_names: Vec::new(),
            current: String::new(),
            aux_counter: 0,
        }
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn consume(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn err(&self, msg: &str) -> ControllerError {
        let t = &self.tokens[self.pos];
        ControllerError::Constraint(format!(
            "grammar error at line {}, column {}: {}",
            t.line, t.col, msg
        ))
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        if *self.peek() != tok {
            return Err(self.err(&format!("expected {what}")));
        }
        self.consume();
        Ok(())
    }

    fn add_rule(&mut self, name: String) -> usize {
        let id = self.rules.len();
        self.names.insert(name.clone(), id);
        self.rules.push(Vec::new());
        self.rule_names.push(name);
        id
    }

    fn aux_rule(&mut self, alternatives: Alternatives) -> usize {
        self.aux_counter += 1;
        let name = format!("{}_{}", self.current, self.aux_counter);
        let id = self.add_rule(name);
        self.rules[id] = alternatives;
        id
    }

    /// Register every rule name up front so forward references resolve.
    fn collect_rule_names(&mut self) -> Result<()> {
        for i in 0..self.tokens.len() {
            if let Tok::RuleName(name) = &self.tokens[i].tok {
                let name = name.clone();
                if self.names.contains_key(&name) {
                    let t = &self.tokens[i];
                    return Err(ControllerError::Constraint(format!(
                        "grammar error at line {}, column {}: rule {:?} defined twice",
                        t.line, t.col, name
                    )));
                }
                self.add_rule(name);
            }
        }
        if self.rules.is_empty() {
            return Err(ControllerError::Constraint("grammar has no rules".into()));
        }
        Ok(())
    }

    fn class_element(&mut self, negated: bool, items: &[(u32, u32)]) -> Result<Vec<Sym>> {
        let mut ascii = ByteClass::default();
        let mut wide: Vec<Vec<u8>> = Vec::new();
        for &(lo, hi) in items {
            if hi < 0x80 {
                ascii.union(&ByteClass::range(lo as u8, hi as u8));
            } else if negated {
                // Non-ASCII exclusions are not tracked; the ASCII part still applies.
                if lo < 0x80 {
                    ascii.union(&ByteClass::range(lo as u8, 0x7F));
                }
            } else if lo == hi {
                let c = char::from_u32(lo).ok_or_else(|| self.err("invalid codepoint in class"))?;
                let mut buf = [0u8; 4];
                wide.push(c.encode_utf8(&mut buf).as_bytes().to_vec());
            } else {
                return Err(self.err("non-ASCII ranges in character classes are not supported"));
            }
        }

        if negated {
            let mut complement = ByteClass::default();
            for b in 0..0x80u8 {
                if !ascii.has(b) {
                    complement.add(b);
                }
            }
            // Any multi-byte UTF-8 character.
            let cont = Sym::Bytes(ByteClass::range(0x80, 0xBF));
            let alternatives = vec![
                vec![Sym::Bytes(complement)],
                vec![Sym::Bytes(ByteClass::range(0xC2, 0xDF)), cont],
                vec![Sym::Bytes(ByteClass::range(0xE0, 0xEF)), cont, cont],
                vec![Sym::Bytes(ByteClass::range(0xF0, 0xF4)), cont, cont, cont],
            ];
            return Ok(vec![Sym::Rule(self.aux_rule(alternatives))]);
        }

        if wide.is_empty() {
            if ascii.is_empty() {
                return Err(self.err("empty character class"));
            }
            return Ok(vec![Sym::Bytes(ascii)]);
        }
        let mut alternatives: Alternatives = wide
            .into_iter()
            .map(|bytes| bytes.into_iter().map(|b| Sym::Bytes(ByteClass::single(b))).collect())
            .collect();
        if !ascii.is_empty() {
            alternatives.push(vec![Sym::Bytes(ascii)]);
        }
        Ok(vec![Sym::Rule(self.aux_rule(alternatives))])
    }

    fn parse_element(&mut self) -> Result<Vec<Sym>> {
        match self.peek().clone() {
            Tok::Literal(bytes) => {
                self.consume();
                Ok(bytes.into_iter().map(|b| Sym::Bytes(ByteClass::single(b))).collect())
            }
            Tok::Class { negated, items } => {
                let syms = self.class_element(negated, &items)?;
                self.consume();
                Ok(syms)
            }
            Tok::Ident(name) => match self.names.get(&name) {
                Some(&id) => {
                    self.consume();
                    Ok(vec![Sym::Rule(id)])
                }
                None => Err(self.err(&format!("rule {name:?} is not defined"))),
            },
            Tok::LParen => {
                self.consume();
                if *self.peek() == Tok::RParen {
                    self.consume();
                    return Ok(Vec::new());
                }
                let mut choices = self.parse_choices()?;
                self.expect(Tok::RParen, ")")?;
                if choices.len() == 1 {
                    Ok(choices.remove(0))
                } else {
                    Ok(vec![Sym::Rule(self.aux_rule(choices))])
                }
            }
            tok => Err(self.err(&format!("expected element, got {tok:?}"))),
        }
    }

    fn parse_int(&mut self) -> Result<u32> {
        match *self.peek() {
            Tok::Int(n) => {
                self.consume();
                Ok(n)
            }
            _ => Err(self.err("expected integer")),
        }
    }

    fn parse_range(&mut self) -> Result<(u32, Option<u32>)> {
        self.expect(Tok::LBrace, "{")?;
        let lower = self.parse_int()?;
        if *self.peek() == Tok::RBrace {
            self.consume();
            return Ok((lower, Some(lower)));
        }
        self.expect(Tok::Comma, "',' or '}'")?;
        if *self.peek() == Tok::RBrace {
            self.consume();
            return Ok((lower, None));
        }
        let upper = self.parse_int()?;
        if upper < lower {
            return Err(self.err("repetition upper bound below lower bound"));
        }
        self.expect(Tok::RBrace, "}")?;
        Ok((lower, Some(upper)))
    }

    fn star(&mut self, e: &[Sym]) -> Sym {
        let id = self.aux_rule(Vec::new());
        let mut again = vec![Sym::Rule(id)];
        again.extend_from_slice(e);
        self.rules[id] = vec![Vec::new(), again];
        Sym::Rule(id)
    }

    fn optional(&mut self, e: &[Sym]) -> Sym {
        Sym::Rule(self.aux_rule(vec![Vec::new(), e.to_vec()]))
    }

    fn repeat(&mut self, e: &[Sym], lower: u32, upper: Option<u32>) -> Vec<Sym> {
        let mut out = Vec::new();
        for _ in 0..lower {
            out.extend_from_slice(e);
        }
        match upper {
            None => out.push(self.star(e)),
            Some(upper) => {
                for _ in lower..upper {
                    out.push(self.optional(e));
                }
            }
        }
        out
    }

    fn parse_quantified(&mut self) -> Result<Vec<Sym>> {
        let e = self.parse_element()?;
        let out = match self.peek() {
            Tok::Star => {
                self.consume();
                vec![self.star(&e)]
            }
            Tok::Plus => {
                self.consume();
                self.repeat(&e, 1, None)
            }
            Tok::Question => {
                self.consume();
                vec![self.optional(&e)]
            }
            Tok::LBrace => {
                let (lower, upper) = self.parse_range()?;
                self.repeat(&e, lower, upper)
            }
            _ => e,
        };
        Ok(out)
    }

    fn parse_sequence(&mut self) -> Result<Vec<Sym>> {
        let mut seq = Vec::new();
        loop {
            match self.peek() {
                Tok::Pipe | Tok::RParen | Tok::RuleName(_) | Tok::Eof => break,
                _ => seq.extend(self.parse_quantified()?),
            }
        }
        Ok(seq)
    }

    fn parse_choices(&mut self) -> Result<Alternatives> {
        let mut choices = vec![self.parse_sequence()?];
        while *self.peek() == Tok::Pipe {
            self.consume();
            choices.push(self.parse_sequence()?);
        }
        Ok(choices)
    }

    fn parse_rule(&mut self) -> Result<()> {
        let name = match self.peek() {
            Tok::RuleName(name) => name.clone(),
            _ => return Err(self.err("expected rule name")),
        };
        self.consume();
        self.expect(Tok::Assign, "::=")?;
        self.current = name.clone();
        self.aux_counter = 0;
        let body = self.parse_choices()?;
        let id = self.names[&name];
        self.rules[id] = body;
        Ok(())
    }

    fn parse(mut self) -> Result<GrammarProgram> {
        self.collect_rule_names()?;
        while *self.peek() != Tok::Eof {
            self.parse_rule()?;
        }
        let start = self.names.get("root").copied().unwrap_or(0);
        Ok(GrammarProgram::new(self.rules, self.rule_names, start))
    }
}

// ─── Compiled grammar ────────────────────────────────────────────────

#[derive(Debug)]
struct Production {
    lhs: usize,
    rhs: Vec<Sym>,
}

/// A grammar compiled to flat BNF, shareable across recognizers.
#[derive(Debug)]
pub struct GrammarProgram {
    productions: Vec<Production>,
    by_lhs: Vec<Vec<usize>>,
    nullable: Vec<bool>,
    rule_names: Vec<String>,
    start: usize,
}

impl GrammarProgram {
    /// Parse an EBNF grammar.
    pub fn from_ebnf(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens).parse()
    }

    fn new(rules: Vec<Alternatives>, rule_names: Vec<String>, start: usize) -> Self {
        let mut productions = Vec::new();
        let mut by_lhs = vec![Vec::new(); rules.len()];
        for (lhs, alternatives) in rules.into_iter().enumerate() {
            for rhs in alternatives {
                by_lhs[lhs].push(productions.len());
                productions.push(Production { lhs, rhs });
            }
        }

        let mut nullable = vec![false; by_lhs.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for p in &productions {
                if nullable[p.lhs] {
                    continue;
                }
                let all_nullable = p.rhs.iter().all(|s| match s {
                    Sym::Rule(r) => nullable[*r],
                    Sym::Bytes(_) => false,
                });
                if all_nullable {
                    nullable[p.lhs] = true;
                    changed = true;
                }
            }
        }

        Self {
            productions,
            by_lhs,
            nullable,
            rule_names,
            start,
        }
    }

    pub fn start_rule(&self) -> &str {
        &self.rule_names[self.start]
    }
}

// ─── Earley recognizer ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Item {
    prod: u32,
    dot: u32,
    origin: u32,
}

#[derive(Debug, Default)]
struct ItemSet {
    items: Vec<Item>,
    seen: FxHashSet<Item>,
}

impl ItemSet {
    fn insert(&mut self, item: Item) {
        if self.seen.insert(item) {
            self.items.push(item);
        }
    }
}

/// Byte recognizer running an Earley parse over a [`GrammarProgram`].
pub struct GrammarRecognizer {
    program: Arc<GrammarProgram>,
    sets: Vec<ItemSet>,
}

impl GrammarRecognizer {
    pub fn new(program: Arc<GrammarProgram>) -> Self {
        let mut first = ItemSet::default();
        for &p in &program.by_lhs[program.start] {
            first.insert(Item {
                prod: p as u32,
                dot: 0,
                origin: 0,
            });
        }
        let mut rec = Self {
            program,
            sets: vec![first],
        };
        rec.close_last();
        rec
    }

    fn next_sym(&self, item: Item) -> Option<Sym> {
        self.program.productions[item.prod as usize]
            .rhs
            .get(item.dot as usize)
            .copied()
    }

    /// Run prediction and completion on the last set until it stops growing.
    fn close_last(&mut self) {
        let k = self.sets.len() - 1;
        let program = Arc::clone(&self.program);
        let mut i = 0;
        while i < self.sets[k].items.len() {
            let item = self.sets[k].items[i];
            i += 1;
            let prod = &program.productions[item.prod as usize];
            match prod.rhs.get(item.dot as usize) {
                Some(Sym::Rule(r)) => {
                    for &p in &program.by_lhs[*r] {
                        self.sets[k].insert(Item {
                            prod: p as u32,
                            dot: 0,
                            origin: k as u32,
                        });
                    }
                    if program.nullable[*r] {
                        self.sets[k].insert(Item {
                            dot: item.dot + 1,
                            ..item
                        });
                    }
                }
                Some(Sym::Bytes(_)) => {}
                None => {
                    let origin = item.origin as usize;
                    let mut j = 0;
                    while j < self.sets[origin].items.len() {
                        let waiting = self.sets[origin].items[j];
                        j += 1;
                        if self.next_sym(waiting) == Some(Sym::Rule(prod.lhs)) {
                            self.sets[k].insert(Item {
                                dot: waiting.dot + 1,
                                ..waiting
                            });
                        }
                    }
                }
            }
        }
    }

    fn last(&self) -> &ItemSet {
        &self.sets[self.sets.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.sets.len() - 1
    }
}

impl Recognizer for GrammarRecognizer {
    fn push_byte(&mut self, byte: u8) -> bool {
        let mut next = ItemSet::default();
        for &item in &self.last().items {
            if let Some(Sym::Bytes(class)) = self.next_sym(item) {
                if class.has(byte) {
                    next.insert(Item {
                        dot: item.dot + 1,
                        ..item
                    });
                }
            }
        }
        if next.items.is_empty() {
            return false;
        }
        self.sets.push(next);
        self.close_last();
        true
    }

    fn pop_bytes(&mut self, n: usize) {
        let keep = self.sets.len().saturating_sub(n).max(1);
        self.sets.truncate(keep);
    }

    fn is_accepting(&self) -> bool {
        let program = &self.program;
        self.last().items.iter().any(|item| {
            let prod = &program.productions[item.prod as usize];
            item.origin == 0 && prod.lhs == program.start && item.dot as usize == prod.rhs.len()
        })
    }

    fn byte_allowed(&mut self, byte: u8) -> bool {
        self.last()
            .items
            .iter()
            .any(|&item| matches!(self.next_sym(item), Some(Sym::Bytes(c)) if c.has(byte)))
    }

    fn can_extend(&mut self) -> bool {
        self.last()
            .items
            .iter()
            .any(|&item| matches!(self.next_sym(item), Some(Sym::Bytes(_))))
    }
}
