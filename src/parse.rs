//! Parser for the spec dialect
//!
//! A recursive-descent parser covering the call-chain subset the shipped
//! handlers work on: receivers, selectors, parenthesized and paren-less
//! arguments, symbol/string/integer literals, hash arguments, and braced
//! blocks with optional parameter lists. One statement per line; `#` starts
//! a comment.
//!
//! The parser guarantees the tree contract the engine relies on: spans of
//! distinct nodes never partially overlap and child spans appear in document
//! order inside their parent's span.

use crate::span::{Location, Span};
use crate::tree::{NodeId, NodeKind, SyntaxTree};
use thiserror::Error;

/// Input that could not be parsed into a tree
#[derive(Debug, Clone, Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    /// Parser message
    pub message: String,
    /// Position of the failure
    pub location: Location,
}

/// Parse source text into a syntax tree
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    let mut parser = Parser::new(source);
    parser.parse_program()?;
    Ok(parser.tree)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tree: SyntaxTree,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            tree: SyntaxTree::new(src),
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            location: Location::of_offset(self.src, self.pos),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip spaces and tabs, and comments to end of line
    fn skip_inline_ws(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip all whitespace including newlines
    fn skip_ws(&mut self) {
        loop {
            self.skip_inline_ws();
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_program(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_ws();
            if self.peek().is_none() {
                return Ok(());
            }
            let stmt = self.parse_expr()?;
            self.tree.add_root(stmt);
            self.skip_inline_ws();
            match self.peek() {
                None => return Ok(()),
                Some(b'\n') => {
                    self.pos += 1;
                }
                _ => return Err(self.error("expected end of statement")),
            }
        }
    }

    fn parse_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_inline_ws();
            if self.peek() == Some(b'.') && self.is_ident_start(self.peek_at(1)) {
                self.pos += 1; // consume the dot
                expr = self.parse_call_on(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn is_ident_start(&self, b: Option<u8>) -> bool {
        matches!(b, Some(c) if c.is_ascii_alphabetic() || c == b'_')
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        match self.peek() {
            Some(b':') => self.parse_symbol(),
            Some(b'"') | Some(b'\'') => self.parse_string(),
            Some(c) if c.is_ascii_digit() => self.parse_integer(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.parse_name(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn read_ident(&mut self) -> Span {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        // Trailing ! or ? belongs to the method name.
        if matches!(self.peek(), Some(b'!') | Some(b'?')) {
            self.pos += 1;
        }
        Span::new(start, self.pos)
    }

    fn parse_symbol(&mut self) -> Result<NodeId, ParseError> {
        let start = self.pos;
        self.pos += 1; // consume ':'
        if !self.is_ident_start(self.peek()) {
            return Err(self.error("expected symbol name"));
        }
        let ident = self.read_ident();
        let span = Span::new(start, ident.end);
        let name = self.src[ident.start..ident.end].to_string();
        Ok(self.tree.push(NodeKind::Sym, Some(name), span))
    }

    fn parse_string(&mut self) -> Result<NodeId, ParseError> {
        let quote = self.bump().unwrap_or(b'"');
        let start = self.pos - 1;
        while let Some(b) = self.bump() {
            if b == quote {
                let span = Span::new(start, self.pos);
                let value = self.src[start + 1..self.pos - 1].to_string();
                return Ok(self.tree.push(NodeKind::Str, Some(value), span));
            }
            if b == b'\n' {
                break;
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn parse_integer(&mut self) -> Result<NodeId, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let span = Span::new(start, self.pos);
        let value = self.src[start..self.pos].to_string();
        Ok(self.tree.push(NodeKind::Int, Some(value), span))
    }

    /// Identifier, constant, or receiverless call (`expect(obj)`, `lambda { }`)
    fn parse_name(&mut self) -> Result<NodeId, ParseError> {
        let ident = self.read_ident();
        let name = self.src[ident.start..ident.end].to_string();
        let capitalized = name.starts_with(|c: char| c.is_ascii_uppercase());

        let has_parens = self.peek() == Some(b'(');
        let has_block = self.peek() == Some(b' ') && self.peek_at(1) == Some(b'{');
        if !has_parens && !has_block {
            let kind = if capitalized {
                NodeKind::Const
            } else {
                NodeKind::Ident
            };
            return Ok(self.tree.push(kind, Some(name), ident));
        }

        let call = self.tree.push(NodeKind::Call, None, ident);
        let selector = self.tree.push(NodeKind::Selector, Some(name), ident);
        self.tree.attach(call, selector);
        let end = self.parse_call_tail(call, ident.end)?;
        self.tree.set_span(call, Span::new(ident.start, end));
        Ok(call)
    }

    /// Parse `.selector[(args)][ { block }][ paren-less arg]` onto a receiver
    fn parse_call_on(&mut self, receiver: NodeId) -> Result<NodeId, ParseError> {
        if !self.is_ident_start(self.peek()) {
            return Err(self.error("expected method name after `.`"));
        }
        let sel_span = self.read_ident();
        let sel_name = self.src[sel_span.start..sel_span.end].to_string();
        let recv_span = self.tree.node(receiver).span;

        let call = self
            .tree
            .push(NodeKind::Call, None, Span::new(recv_span.start, sel_span.end));
        self.tree.attach(call, receiver);
        let selector = self.tree.push(NodeKind::Selector, Some(sel_name), sel_span);
        self.tree.attach(call, selector);

        let end = self.parse_call_tail(call, sel_span.end)?;
        self.tree.set_span(call, Span::new(recv_span.start, end));
        Ok(call)
    }

    /// Arguments, block, and paren-less argument following a selector.
    /// Returns the end offset of the whole call.
    fn parse_call_tail(&mut self, call: NodeId, mut end: usize) -> Result<usize, ParseError> {
        if self.eat(b'(') {
            self.skip_ws();
            if !self.eat(b')') {
                let args = self.parse_args()?;
                for arg in args {
                    self.tree.attach(call, arg);
                }
                self.skip_ws();
                if !self.eat(b')') {
                    return Err(self.error("expected `)`"));
                }
            }
            end = self.pos;
        } else if self.starts_paren_less_arg() {
            self.skip_inline_ws();
            let arg = self.parse_expr()?;
            end = self.tree.node(arg).span.end;
            self.tree.attach(call, arg);
            return Ok(end);
        }

        // Optional trailing block.
        let checkpoint = self.pos;
        self.skip_inline_ws();
        if self.peek() == Some(b'{') {
            let block = self.parse_block()?;
            self.tree.attach(call, block);
            end = self.tree.node(block).span.end;
        } else {
            self.pos = checkpoint;
        }
        Ok(end)
    }

    /// A space followed by an expression start (not a dot chain) begins a
    /// paren-less argument, as in `obj.should eq(1)`.
    fn starts_paren_less_arg(&self) -> bool {
        if self.peek() != Some(b' ') {
            return false;
        }
        let mut i = self.pos;
        while self.bytes.get(i) == Some(&b' ') {
            i += 1;
        }
        match self.bytes.get(i) {
            Some(b':') | Some(b'"') | Some(b'\'') => true,
            Some(c) if c.is_ascii_digit() => true,
            Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {
                // `{` after an identifier would be a block, which is fine too;
                // but a bare `{` here belongs to this call, not an argument.
                true
            }
            _ => false,
        }
    }

    fn parse_args(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let first = self.parse_expr()?;
        self.skip_ws();
        if self.peek() == Some(b'=') && self.peek_at(1) == Some(b'>') {
            return Ok(vec![self.parse_hash_from(first)?]);
        }
        let mut args = vec![first];
        while self.eat(b',') {
            self.skip_ws();
            args.push(self.parse_expr()?);
            self.skip_ws();
        }
        Ok(args)
    }

    /// Hash argument list: `:a => 1, :b => 2` (first key already parsed)
    fn parse_hash_from(&mut self, first_key: NodeId) -> Result<NodeId, ParseError> {
        let start = self.tree.node(first_key).span.start;
        let hash = self.tree.push(NodeKind::Hash, None, Span::new(start, start));
        let mut key = first_key;
        let mut end;
        loop {
            self.skip_ws();
            if !(self.eat(b'=') && self.eat(b'>')) {
                return Err(self.error("expected `=>` in hash argument"));
            }
            self.skip_ws();
            let value = self.parse_expr()?;
            end = self.tree.node(value).span.end;
            let pair_span = Span::new(self.tree.node(key).span.start, end);
            let pair = self.tree.push(NodeKind::Pair, None, pair_span);
            self.tree.attach(pair, key);
            self.tree.attach(pair, value);
            self.tree.attach(hash, pair);

            self.skip_ws();
            if !self.eat(b',') {
                break;
            }
            self.skip_ws();
            key = self.parse_expr()?;
        }
        self.tree.set_span(hash, Span::new(start, end));
        Ok(hash)
    }

    /// Braced block with optional `|params|`
    fn parse_block(&mut self) -> Result<NodeId, ParseError> {
        let start = self.pos;
        self.pos += 1; // consume '{'
        let block = self.tree.push(NodeKind::Block, None, Span::new(start, start));

        self.skip_inline_ws();
        let params = if self.peek() == Some(b'|') {
            let params_start = self.pos;
            self.pos += 1;
            let params = self
                .tree
                .push(NodeKind::Params, None, Span::new(params_start, params_start));
            loop {
                self.skip_inline_ws();
                if self.eat(b'|') {
                    break;
                }
                if !self.is_ident_start(self.peek()) {
                    return Err(self.error("expected block parameter"));
                }
                let ident = self.read_ident();
                let name = self.src[ident.start..ident.end].to_string();
                let param = self.tree.push(NodeKind::Ident, Some(name), ident);
                self.tree.attach(params, param);
                self.skip_inline_ws();
                self.eat(b',');
            }
            self.tree.set_span(params, Span::new(params_start, self.pos));
            params
        } else {
            // Zero-width parameter slot right after the brace; handlers that
            // add a parameter insert here.
            self.tree
                .push(NodeKind::Params, None, Span::new(start + 1, start + 1))
        };
        self.tree.attach(block, params);

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b';') => {
                    self.pos += 1;
                }
                Some(_) => {
                    let stmt = self.parse_expr()?;
                    self.tree.attach(block, stmt);
                }
                None => return Err(self.error("unterminated block")),
            }
        }
        self.tree.set_span(block, Span::new(start, self.pos));
        Ok(block)
    }
}
