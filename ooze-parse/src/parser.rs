use ooze_ast::{
    span_between, Ast, AstId, AstTag, Span, SrcId, SrcRef, TypeGraph, TypeRef,
};
use ooze_lex::{Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    src: SrcId,
    ast: &'a mut Ast,
    tg: &'a mut TypeGraph,
    pub(crate) type_reqs: Vec<(TypeRef, SrcRef)>,
    pub(crate) errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        src: SrcId,
        ast: &'a mut Ast,
        tg: &'a mut TypeGraph,
    ) -> Self {
        Self {
            tokens,
            idx: 0,
            src,
            ast,
            tg,
            type_reqs: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.idx.min(self.tokens.len() - 1)].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.idx.min(self.tokens.len() - 1)].span
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn next(&mut self) -> Token {
        let token = self.tokens[self.idx.min(self.tokens.len() - 1)].clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        token
    }

    fn prev_end(&self) -> usize {
        if self.idx == 0 {
            return 0;
        }
        let span = self.tokens[self.idx - 1].span;
        span.offset() + span.len()
    }

    fn here(&self, span: Span) -> SrcRef {
        SrcRef::new(self.src, span)
    }

    fn from(&self, start: usize) -> SrcRef {
        SrcRef::new(self.src, span_between(start, self.prev_end()))
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.src, self.peek_span())
    }

    fn expected(&self, what: &str) -> ParseError {
        self.error(format!("expected {what}, found {}", self.peek().describe()))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(&kind) {
            Ok(self.next())
        } else {
            Err(self.expected(kind.describe()))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                let span = self.next().span;
                Ok((name, span))
            }
            _ => Err(self.expected("identifier")),
        }
    }

    pub(crate) fn expect_eof(&mut self) -> Result<(), ParseError> {
        if self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.expected("end of input"))
        }
    }

    // ---- entry productions ----

    /// script := { fn }
    ///
    /// Accumulates errors, synchronizing to the next top-level `fn`.
    pub fn module(&mut self) -> AstId {
        let start = self.peek_span().offset();
        let mut fns = Vec::new();

        while !self.at(&TokenKind::Eof) {
            match self.function() {
                Ok(f) => fns.push(f),
                Err(err) => {
                    self.errors.push(err);
                    self.sync_to_fn();
                }
            }
        }

        let src = self.from(start);
        let unit = self.tg.unit();
        self.ast.add(AstTag::Module, src, unit, &fns)
    }

    fn sync_to_fn(&mut self) {
        // Step off the token that failed, then scan for the next `fn`.
        if !self.at(&TokenKind::Eof) {
            self.next();
        }
        while !self.at(&TokenKind::Eof) && !self.at(&TokenKind::KwFn) {
            self.next();
        }
    }

    /// fn := "fn" ident "(" pat_list ")" "->" type ("=" expr | block)
    pub fn function(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        self.expect(TokenKind::KwFn)?;
        let (_, name_span) = self.expect_ident()?;
        let name_src = self.here(name_span);
        let floating = self.tg.floating(name_src);
        let name_pat = self.ast.add(AstTag::PatternIdent, name_src, floating, &[]);

        let params_start = self.peek_span().offset();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut param_tys = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let pattern = self.pattern()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.type_ref()?;
            self.ast.set_ty(pattern, ty);
            params.push(pattern);
            param_tys.push(ty);
            if !self.at(&TokenKind::RParen) {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;
        let params_src = self.from(params_start);
        let params_ty = self.tg.tuple(param_tys, params_src);
        let param_pat = self
            .ast
            .add(AstTag::PatternTuple, params_src, params_ty, &params);

        self.expect(TokenKind::Arrow)?;
        let ret_ty = self.type_ref()?;

        let body = if self.at(&TokenKind::Eq) {
            self.next();
            self.expr()?
        } else if self.at(&TokenKind::LBrace) {
            self.block()?
        } else {
            return Err(self.expected("'=' or '{'"));
        };

        let fn_src = self.from(start);
        let fn_ty = self.tg.func(params_ty, ret_ty, fn_src);
        let fn_id = self.ast.add(AstTag::Fn, fn_src, fn_ty, &[param_pat, body]);

        let unit = self.tg.unit();
        Ok(self
            .ast
            .add(AstTag::RootFn, name_src, unit, &[name_pat, fn_id]))
    }

    /// repl := expr | assignment
    pub fn repl(&mut self) -> Result<AstId, ParseError> {
        let root = if self.at(&TokenKind::KwLet) {
            self.assignment()?
        } else {
            self.expr()?
        };
        self.expect_eof()?;
        Ok(root)
    }

    /// stmt := "let" pattern [":" type] "=" expr
    fn assignment(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        self.expect(TokenKind::KwLet)?;
        let pattern = self.pattern()?;
        if self.at(&TokenKind::Colon) {
            self.next();
            let ty = self.type_ref()?;
            self.ast.set_ty(pattern, ty);
        }
        self.expect(TokenKind::Eq)?;
        let rhs = self.expr()?;
        let src = self.from(start);
        let unit = self.tg.unit();
        Ok(self
            .ast
            .add(AstTag::Assignment, src, unit, &[pattern, rhs]))
    }

    /// pattern := "_" | ident | "(" pat_list ")"
    pub fn pattern(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        match self.peek().clone() {
            TokenKind::Underscore => {
                let span = self.next().span;
                let src = self.here(span);
                let floating = self.tg.floating(src);
                Ok(self.ast.add(AstTag::PatternWildcard, src, floating, &[]))
            }
            TokenKind::Ident(_) => {
                let span = self.next().span;
                let src = self.here(span);
                let floating = self.tg.floating(src);
                Ok(self.ast.add(AstTag::PatternIdent, src, floating, &[]))
            }
            TokenKind::LParen => {
                self.next();
                let mut children = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    children.push(self.pattern()?);
                    if !self.at(&TokenKind::RParen) {
                        self.expect(TokenKind::Comma)?;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let src = self.from(start);
                let child_tys = children.iter().map(|c| self.ast.ty(*c)).collect();
                let ty = self.tg.tuple(child_tys, src);
                Ok(self.ast.add(AstTag::PatternTuple, src, ty, &children))
            }
            _ => Err(self.expected("pattern")),
        }
    }

    /// binding := pattern [":" type]
    pub fn binding(&mut self) -> Result<AstId, ParseError> {
        let pattern = self.pattern()?;
        if self.at(&TokenKind::Colon) {
            self.next();
            let ty = self.type_ref()?;
            self.ast.set_ty(pattern, ty);
        }
        self.expect_eof()?;
        Ok(pattern)
    }

    /// type := ident | "_" | "&" type | "(" type_list ")" | "fn" type "->" type
    pub fn type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let start = self.peek_span().offset();
        match self.peek().clone() {
            TokenKind::Underscore => {
                let span = self.next().span;
                Ok(self.tg.floating(self.here(span)))
            }
            TokenKind::Ident(_) => {
                let span = self.next().span;
                let src = self.here(span);
                let t = self.tg.named(src);
                self.type_reqs.push((t, src));
                Ok(t)
            }
            TokenKind::Amp => {
                self.next();
                let inner = self.type_ref()?;
                let src = self.from(start);
                Ok(self.tg.borrow(inner, src))
            }
            TokenKind::LParen => {
                self.next();
                let mut children = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    children.push(self.type_ref()?);
                    if !self.at(&TokenKind::RParen) {
                        self.expect(TokenKind::Comma)?;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let src = self.from(start);
                Ok(self.tg.tuple(children, src))
            }
            TokenKind::KwFn => {
                self.next();
                let input = self.type_ref()?;
                self.expect(TokenKind::Arrow)?;
                let output = self.type_ref()?;
                let src = self.from(start);
                Ok(self.tg.func(input, output, src))
            }
            _ => Err(self.expected("type")),
        }
    }

    /// expr := literal | ident | tuple | borrow | call | select | block
    pub fn expr(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        if self.at(&TokenKind::Amp) {
            self.next();
            let inner = self.expr()?;
            let src = self.from(start);
            let inner_ty = self.ast.ty(inner);
            let ty = self.tg.borrow(inner_ty, src);
            return Ok(self.ast.add(AstTag::ExprBorrow, src, ty, &[inner]));
        }

        let mut expr = self.primary()?;

        // call := expr "(" expr_list ")"   (left-associative)
        while self.at(&TokenKind::LParen) {
            let args_start = self.peek_span().offset();
            self.next();
            let mut args = Vec::new();
            while !self.at(&TokenKind::RParen) {
                args.push(self.expr()?);
                if !self.at(&TokenKind::RParen) {
                    self.expect(TokenKind::Comma)?;
                }
            }
            self.expect(TokenKind::RParen)?;
            let args_src = self.from(args_start);
            let arg_tys = args.iter().map(|a| self.ast.ty(*a)).collect();
            let args_ty = self.tg.tuple(arg_tys, args_src);
            let arg_tuple = self.ast.add(AstTag::ExprTuple, args_src, args_ty, &args);

            let src = self.from(start);
            let floating = self.tg.floating(src);
            expr = self
                .ast
                .add(AstTag::ExprCall, src, floating, &[expr, arg_tuple]);
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        match self.peek().clone() {
            TokenKind::Literal(lit) => {
                let span = self.next().span;
                let src = self.here(span);
                let floating = self.tg.floating(src);
                Ok(self.ast.add_literal(src, floating, lit))
            }
            TokenKind::Ident(_) => {
                let span = self.next().span;
                let src = self.here(span);
                let floating = self.tg.floating(src);
                Ok(self.ast.add(AstTag::ExprIdent, src, floating, &[]))
            }
            TokenKind::LParen => {
                self.next();
                let mut children = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    children.push(self.expr()?);
                    if !self.at(&TokenKind::RParen) {
                        self.expect(TokenKind::Comma)?;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let src = self.from(start);
                let child_tys = children.iter().map(|c| self.ast.ty(*c)).collect();
                let ty = self.tg.tuple(child_tys, src);
                Ok(self.ast.add(AstTag::ExprTuple, src, ty, &children))
            }
            TokenKind::KwSelect => {
                self.next();
                let cond = self.expr()?;
                let then_expr = self.block()?;
                self.expect(TokenKind::KwElse)?;
                let else_expr = self.block()?;
                let src = self.from(start);
                let floating = self.tg.floating(src);
                Ok(self.ast.add(
                    AstTag::ExprSelect,
                    src,
                    floating,
                    &[cond, then_expr, else_expr],
                ))
            }
            TokenKind::LBrace => self.block(),
            _ => Err(self.expected("expression")),
        }
    }

    /// block := "{" { stmt ";" } expr "}"
    ///
    /// A block lowers to nested `ExprWith` nodes, one per statement.
    fn block(&mut self) -> Result<AstId, ParseError> {
        let start = self.peek_span().offset();
        self.expect(TokenKind::LBrace)?;

        let mut assignments = Vec::new();
        while self.at(&TokenKind::KwLet) {
            match self.assignment() {
                Ok(a) => {
                    self.expect(TokenKind::Semi)?;
                    assignments.push(a);
                }
                Err(err) => {
                    self.errors.push(err);
                    self.sync_to_stmt();
                }
            }
        }

        let mut result = self.expr()?;
        self.expect(TokenKind::RBrace)?;

        let src = self.from(start);
        for assignment in assignments.into_iter().rev() {
            let floating = self.tg.floating(src);
            result = self
                .ast
                .add(AstTag::ExprWith, src, floating, &[assignment, result]);
        }
        Ok(result)
    }

    fn sync_to_stmt(&mut self) {
        while !self.at(&TokenKind::Semi)
            && !self.at(&TokenKind::RBrace)
            && !self.at(&TokenKind::Eof)
        {
            self.next();
        }
        if self.at(&TokenKind::Semi) {
            self.next();
        }
    }
}
