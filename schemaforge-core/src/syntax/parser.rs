use super::ast::{
    BinOp, BoolOp, ClassDef, CmpOp, Constant, Expr, ExprKind, FunctionDef, ImportAlias,
    ImportTargets, Keyword, Module, Stmt, StmtKind, UnaryOp,
};
use super::lexer::tokenize;
use super::token::{Keyword as Kw, Token, TokenKind};
use super::{SyntaxError, SyntaxErrorKind};

type ParseResult<T> = Result<T, SyntaxError>;

/// Parse a whole source file.
pub fn parse_module(source: &str, max_depth: usize) -> ParseResult<Module> {
    let mut parser = Parser::new(tokenize(source)?, max_depth);
    let mut body = Vec::new();
    while !parser.at_eof() {
        if parser.eat_newline() {
            continue;
        }
        body.extend(parser.statement()?);
    }
    Ok(Module { body })
}

/// Parse a single expression, as used for string annotations.
pub fn parse_expression(source: &str, max_depth: usize) -> ParseResult<Expr> {
    let mut parser = Parser::new(tokenize(source.trim())?, max_depth);
    let expr = parser.testlist()?;
    parser.eat_newline();
    if !parser.at_eof() {
        return Err(parser.invalid());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    eof: Token,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        let last_line = tokens.last().map_or(1, |token| token.line);
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
            eof: Token::new(TokenKind::EndOfFile, last_line),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_nth(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::EndOfFile)
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_punct(punct)
    }

    fn at_keyword(&self, keyword: Kw) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Kw) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_newline(&mut self) -> bool {
        if matches!(self.peek().kind, TokenKind::Newline) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(SyntaxError::invalid(format!("expected '{punct}'"), self.line()))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.invalid()),
        }
    }

    fn invalid(&self) -> SyntaxError {
        SyntaxError::invalid("invalid syntax", self.line())
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SyntaxError {
                kind: SyntaxErrorKind::NestingLimit(self.max_depth),
                message: "too many nested blocks or parentheses".to_string(),
                line: self.line(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn statement(&mut self) -> ParseResult<Vec<Stmt>> {
        self.enter()?;
        let result = self.statement_inner();
        self.leave();
        result
    }

    fn statement_inner(&mut self) -> ParseResult<Vec<Stmt>> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Indent => Err(SyntaxError::indentation("unexpected indent", token.line)),
            TokenKind::Punct("@") => Ok(vec![self.decorated()?]),
            TokenKind::Keyword(Kw::Class) => Ok(vec![self.class_def(Vec::new())?]),
            TokenKind::Keyword(Kw::Def) => Ok(vec![self.function_def(Vec::new(), false)?]),
            TokenKind::Keyword(Kw::Async) => {
                self.advance();
                if self.at_keyword(Kw::Def) {
                    Ok(vec![self.function_def(Vec::new(), true)?])
                } else {
                    Err(SyntaxError::unsupported(
                        format!("'async {}' statement", self.peek().kind),
                        token.line,
                    ))
                }
            }
            TokenKind::Keyword(Kw::If) => Ok(vec![self.if_stmt()?]),
            TokenKind::Keyword(keyword @ (Kw::For | Kw::While | Kw::Try | Kw::With)) => Err(
                SyntaxError::unsupported(format!("'{}' statement", keyword.as_str()), token.line),
            ),
            TokenKind::Keyword(Kw::Elif | Kw::Else | Kw::Except | Kw::Finally) => {
                Err(SyntaxError::invalid("invalid syntax", token.line))
            }
            _ => self.simple_statements(),
        }
    }

    fn simple_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_punct(";") {
            if matches!(
                self.peek().kind,
                TokenKind::Newline | TokenKind::EndOfFile
            ) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        if !self.eat_newline() && !self.at_eof() {
            return Err(self.invalid());
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        let kind = match &self.peek().kind {
            TokenKind::Keyword(Kw::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Keyword(Kw::Import) => self.import_stmt()?,
            TokenKind::Keyword(Kw::From) => self.from_import_stmt()?,
            TokenKind::Keyword(Kw::Raise) => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise {
                        exc: None,
                        cause: None,
                    }
                } else {
                    let exc = self.test()?;
                    let cause = if self.eat_keyword(Kw::From) {
                        Some(self.test()?)
                    } else {
                        None
                    };
                    StmtKind::Raise {
                        exc: Some(exc),
                        cause,
                    }
                }
            }
            TokenKind::Keyword(Kw::Assert) => {
                self.advance();
                let test = self.test()?;
                let msg = if self.eat_punct(",") {
                    Some(self.test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Keyword(
                keyword @ (Kw::Return
                | Kw::Global
                | Kw::Nonlocal
                | Kw::Del
                | Kw::Break
                | Kw::Continue
                | Kw::Yield),
            ) => {
                return Err(SyntaxError::unsupported(
                    format!("'{}' statement", keyword.as_str()),
                    line,
                ));
            }
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::EndOfFile | TokenKind::Punct(";")
        )
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.testlist()?;

        if self.eat_punct(":") {
            check_single_target(&first)?;
            let annotation = self.test()?;
            let value = if self.eat_punct("=") {
                Some(self.testlist()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if self.at_punct("=") {
            let mut chain = vec![first];
            while self.eat_punct("=") {
                chain.push(self.testlist()?);
            }
            let value = chain.pop().ok_or_else(|| self.invalid())?;
            for target in &chain {
                check_target(target)?;
            }
            return Ok(StmtKind::Assign {
                targets: chain,
                value,
            });
        }

        if let TokenKind::Punct(punct) = self.peek().kind {
            if punct.len() >= 2
                && punct.ends_with('=')
                && !matches!(punct, "==" | "!=" | "<=" | ">=")
            {
                return Err(SyntaxError::unsupported("augmented assignment", self.line()));
            }
            if punct == ":=" {
                return Err(SyntaxError::unsupported("assignment expressions", self.line()));
            }
        }

        Ok(StmtKind::Expr(first))
    }

    fn dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_punct(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn import_stmt(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let asname = if self.eat_keyword(Kw::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportAlias { name, asname });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn from_import_stmt(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        let mut level = 0;
        loop {
            if self.eat_punct(".") {
                level += 1;
            } else if self.eat_punct("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.at_keyword(Kw::Import) {
            if level == 0 {
                return Err(self.invalid());
            }
            None
        } else {
            Some(self.dotted_name()?)
        };
        if !self.eat_keyword(Kw::Import) {
            return Err(SyntaxError::invalid("expected 'import'", self.line()));
        }

        if self.eat_punct("*") {
            return Ok(StmtKind::ImportFrom {
                module,
                level,
                names: ImportTargets::Star,
            });
        }

        let parenthesized = self.eat_punct("(");
        let mut names = Vec::new();
        loop {
            if parenthesized && self.at_punct(")") {
                break;
            }
            let name = self.expect_name()?;
            let asname = if self.eat_keyword(Kw::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportAlias { name, asname });
            if !self.eat_punct(",") {
                break;
            }
            if !parenthesized && self.at_statement_end() {
                return Err(SyntaxError::invalid(
                    "trailing comma not allowed without surrounding parentheses",
                    self.line(),
                ));
            }
        }
        if parenthesized {
            self.expect_punct(")")?;
        }
        if names.is_empty() {
            return Err(self.invalid());
        }
        Ok(StmtKind::ImportFrom {
            module,
            level,
            names: ImportTargets::Names(names),
        })
    }

    fn decorated(&mut self) -> ParseResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_punct("@") {
            decorators.push(self.test()?);
            if !self.eat_newline() {
                return Err(self.invalid());
            }
        }
        if self.at_keyword(Kw::Class) {
            self.class_def(decorators)
        } else if self.at_keyword(Kw::Def) {
            self.function_def(decorators, false)
        } else if self.eat_keyword(Kw::Async) && self.at_keyword(Kw::Def) {
            self.function_def(decorators, true)
        } else {
            Err(self.invalid())
        }
    }

    fn class_def(&mut self, decorators: Vec<Expr>) -> ParseResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        let mut keywords = Vec::new();
        if self.eat_punct("(") {
            let (args, kwargs) = self.call_arguments()?;
            bases = args;
            keywords = kwargs;
        }
        if !self.eat_punct(":") {
            return Err(SyntaxError::invalid("expected ':'", self.line()));
        }
        let body = self.block("class definition", line)?;
        Ok(Stmt {
            kind: StmtKind::ClassDef(ClassDef {
                name,
                bases,
                keywords,
                body,
                decorators,
            }),
            line,
        })
    }

    fn block(&mut self, owner: &str, owner_line: usize) -> ParseResult<Vec<Stmt>> {
        if !self.eat_newline() {
            return self.simple_statements();
        }
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(SyntaxError::indentation(
                format!("expected an indented block after {owner} on line {owner_line}"),
                self.line(),
            ));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> ParseResult<Stmt> {
        let line = self.line();
        self.advance();
        let name = self.expect_name()?;
        if !self.at_punct("(") {
            return Err(SyntaxError::invalid("expected '('", self.line()));
        }
        let params = self.skip_parameters()?;
        if self.eat_punct("->") {
            self.test()?;
        }
        if !self.eat_punct(":") {
            return Err(SyntaxError::invalid("expected ':'", self.line()));
        }
        self.skip_body(line)?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(FunctionDef {
                name,
                params,
                decorators,
                is_async,
            }),
            line,
        })
    }

    /// Consume a parenthesised parameter list, returning parameter names.
    fn skip_parameters(&mut self) -> ParseResult<Vec<String>> {
        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut expect_param = true;
        loop {
            let token = self.advance();
            match &token.kind {
                TokenKind::Punct("(" | "[" | "{") => {
                    depth += 1;
                    if depth == 1 {
                        expect_param = true;
                    }
                }
                TokenKind::Punct(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(params);
                    }
                }
                TokenKind::Punct(",") if depth == 1 => expect_param = true,
                TokenKind::Punct("*" | "**" | "/") if depth == 1 => {}
                TokenKind::Name(name) if depth == 1 && expect_param => {
                    params.push(name.clone());
                    expect_param = false;
                }
                TokenKind::EndOfFile => {
                    return Err(SyntaxError::invalid("'(' was never closed", token.line));
                }
                _ => {
                    if depth == 1 {
                        expect_param = false;
                    }
                }
            }
        }
    }

    /// Skip a function body without interpreting it.
    fn skip_body(&mut self, def_line: usize) -> ParseResult<()> {
        if !self.eat_newline() {
            while !self.at_eof() && !self.eat_newline() {
                self.advance();
            }
            return Ok(());
        }
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(SyntaxError::indentation(
                format!("expected an indented block after function definition on line {def_line}"),
                self.line(),
            ));
        }
        let mut level = 0usize;
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::Indent => level += 1,
                TokenKind::Dedent => {
                    level = level.saturating_sub(1);
                    if level == 0 {
                        return Ok(());
                    }
                }
                TokenKind::EndOfFile => return Ok(()),
                _ => {}
            }
        }
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        self.advance();
        let test = self.named_test()?;
        if !self.eat_punct(":") {
            return Err(SyntaxError::invalid("expected ':'", self.line()));
        }
        let body = self.block("'if' statement", line)?;
        let orelse = if self.at_keyword(Kw::Elif) {
            vec![self.if_stmt()?]
        } else if self.at_keyword(Kw::Else) {
            let else_line = self.line();
            self.advance();
            if !self.eat_punct(":") {
                return Err(SyntaxError::invalid("expected ':'", self.line()));
            }
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            line,
        })
    }

    fn named_test(&mut self) -> ParseResult<Expr> {
        let expr = self.test()?;
        if self.at_punct(":=") {
            return Err(SyntaxError::unsupported("assignment expressions", self.line()));
        }
        Ok(expr)
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn starts_expression(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::FString(_)
            | TokenKind::Bytes(_) => true,
            TokenKind::Keyword(keyword) => matches!(
                keyword,
                Kw::None | Kw::True | Kw::False | Kw::Not | Kw::Lambda | Kw::Await
            ),
            TokenKind::Punct(punct) => {
                matches!(*punct, "(" | "[" | "{" | "-" | "+" | "~" | "..." | "*")
            }
            _ => false,
        }
    }

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// makes a tuple.
    fn testlist(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let first = self.test()?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn test(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.test_inner();
        self.leave();
        result
    }

    fn test_inner(&mut self) -> ParseResult<Expr> {
        if self.at_keyword(Kw::Lambda) {
            return self.lambda();
        }
        let line = self.line();
        let body = self.or_test()?;
        if self.eat_keyword(Kw::If) {
            let test = self.or_test()?;
            if !self.eat_keyword(Kw::Else) {
                return Err(SyntaxError::invalid(
                    "expected 'else' after 'if' expression",
                    self.line(),
                ));
            }
            let orelse = self.test()?;
            return Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                line,
            ));
        }
        Ok(body)
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.advance();
        let mut params = Vec::new();
        let mut expect_param = true;
        let mut depth = 0usize;
        loop {
            if depth == 0 && self.at_punct(":") {
                break;
            }
            let token = self.advance();
            match &token.kind {
                TokenKind::Punct("(" | "[" | "{") => depth += 1,
                TokenKind::Punct(")" | "]" | "}") => depth = depth.saturating_sub(1),
                TokenKind::Punct(",") if depth == 0 => expect_param = true,
                TokenKind::Punct("*" | "**" | "/") if depth == 0 => {}
                TokenKind::Name(name) if depth == 0 && expect_param => {
                    params.push(name.clone());
                    expect_param = false;
                }
                TokenKind::Newline | TokenKind::EndOfFile => return Err(self.invalid()),
                _ => {
                    if depth == 0 {
                        expect_param = false;
                    }
                }
            }
        }
        self.expect_punct(":")?;
        // The body is checked for well-formedness only.
        self.test()?;
        Ok(Expr::new(
            ExprKind::Lambda(Box::new(FunctionDef {
                name: "<lambda>".to_string(),
                params,
                decorators: Vec::new(),
                is_async: false,
            })),
            line,
        ))
    }

    fn or_test(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let first = self.and_test()?;
        if !self.at_keyword(Kw::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(Kw::Or) {
            values.push(self.and_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::Or,
                values,
            },
            line,
        ))
    }

    fn and_test(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let first = self.not_test()?;
        if !self.at_keyword(Kw::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(Kw::And) {
            values.push(self.not_test()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::And,
                values,
            },
            line,
        ))
    }

    fn not_test(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        if self.eat_keyword(Kw::Not) {
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand?),
                },
                line,
            ));
        }
        self.comparison()
    }

    fn comparison_operator(&mut self) -> Option<CmpOp> {
        let op = match &self.peek().kind {
            TokenKind::Punct("==") => CmpOp::Eq,
            TokenKind::Punct("!=") => CmpOp::NotEq,
            TokenKind::Punct("<") => CmpOp::Lt,
            TokenKind::Punct("<=") => CmpOp::LtE,
            TokenKind::Punct(">") => CmpOp::Gt,
            TokenKind::Punct(">=") => CmpOp::GtE,
            TokenKind::Keyword(Kw::In) => CmpOp::In,
            TokenKind::Keyword(Kw::Not) if self.peek_nth(1).is_keyword(Kw::In) => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            TokenKind::Keyword(Kw::Is) => {
                if self.peek_nth(1).is_keyword(Kw::Not) {
                    self.pos += 2;
                    return Some(CmpOp::IsNot);
                }
                CmpOp::Is
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let left = self.binary(0)?;
        let mut comparisons = Vec::new();
        while let Some(op) = self.comparison_operator() {
            comparisons.push((op, self.binary(0)?));
        }
        if comparisons.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                comparisons,
            },
            line,
        ))
    }

    /// Precedence climbing over the binary operator tiers, loosest first.
    fn binary(&mut self, tier: usize) -> ParseResult<Expr> {
        const TIERS: &[&[(&str, BinOp)]] = &[
            &[("|", BinOp::BitOr)],
            &[("^", BinOp::BitXor)],
            &[("&", BinOp::BitAnd)],
            &[("<<", BinOp::LShift), (">>", BinOp::RShift)],
            &[("+", BinOp::Add), ("-", BinOp::Sub)],
            &[
                ("*", BinOp::Mult),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMult),
            ],
        ];

        let Some(operators) = TIERS.get(tier) else {
            return self.factor();
        };
        let line = self.line();
        let mut left = self.binary(tier + 1)?;
        loop {
            let matched = operators
                .iter()
                .find(|(symbol, _)| self.at_punct(symbol))
                .map(|(_, op)| *op);
            let Some(op) = matched else { break };
            self.advance();
            let right = self.binary(tier + 1)?;
            left = Expr::new(
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let op = match self.peek().kind {
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Pos),
            TokenKind::Punct("~") => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            self.enter()?;
            let operand = self.factor();
            self.leave();
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand?),
                },
                line,
            ));
        }
        self.power()
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        if self.at_keyword(Kw::Await) {
            return Err(SyntaxError::unsupported("'await' expressions", line));
        }
        let base = self.primary()?;
        if self.eat_punct("**") {
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            return Ok(Expr::new(
                ExprKind::BinOp {
                    left: Box::new(base),
                    op: BinOp::Pow,
                    right: Box::new(exponent?),
                },
                line,
            ));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            let line = self.line();
            if self.eat_punct(".") {
                let attr = self.expect_name()?;
                expr = Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    line,
                );
            } else if self.eat_punct("[") {
                let index = self.subscript()?;
                self.expect_punct("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else if self.eat_punct("(") {
                let (args, keywords) = self.call_arguments()?;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    line,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn subscript(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.at_punct("]") {
                break;
            }
            if self.at_punct(":") {
                return Err(SyntaxError::unsupported("slices", line));
            }
            items.push(self.test()?);
            if self.at_punct(":") {
                return Err(SyntaxError::unsupported("slices", line));
            }
            trailing_comma = self.eat_punct(",");
            if !trailing_comma {
                break;
            }
        }
        match items.len() {
            0 => Err(self.invalid()),
            1 if !trailing_comma => Ok(items.pop().ok_or_else(|| self.invalid())?),
            _ => Ok(Expr::new(ExprKind::Tuple(items), line)),
        }
    }

    /// Arguments after an opening parenthesis, consuming the closing one.
    fn call_arguments(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        loop {
            if self.eat_punct(")") {
                break;
            }
            if self.at_punct("*") || self.at_punct("**") {
                return Err(SyntaxError::unsupported("argument unpacking", self.line()));
            }
            let is_keyword = matches!(self.peek().kind, TokenKind::Name(_))
                && self.peek_nth(1).is_punct("=");
            if is_keyword {
                let name = self.expect_name()?;
                self.advance();
                if keywords.iter().any(|existing| existing.name == name) {
                    return Err(SyntaxError::invalid(
                        format!("keyword argument repeated: {name}"),
                        self.line(),
                    ));
                }
                let value = self.test()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(SyntaxError::invalid(
                        "positional argument follows keyword argument",
                        self.line(),
                    ));
                }
                args.push(self.test()?);
                if self.at_keyword(Kw::For) {
                    return Err(SyntaxError::unsupported("comprehensions", self.line()));
                }
            }
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok((args, keywords))
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let line = token.line;
        let kind = match token.kind {
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::Keyword(Kw::None) => ExprKind::Constant(Constant::None),
            TokenKind::Keyword(Kw::True) => ExprKind::Constant(Constant::Bool(true)),
            TokenKind::Keyword(Kw::False) => ExprKind::Constant(Constant::Bool(false)),
            TokenKind::Int(value) => ExprKind::Constant(Constant::Int(value)),
            TokenKind::Float(value) => ExprKind::Constant(Constant::Float(value)),
            TokenKind::Str(text) => ExprKind::Constant(self.string_concat(Constant::Str(text))?),
            TokenKind::Bytes(bytes) => {
                ExprKind::Constant(self.string_concat(Constant::Bytes(bytes))?)
            }
            TokenKind::FString(_) => return Err(SyntaxError::unsupported("f-strings", line)),
            TokenKind::Punct("...") => ExprKind::Constant(Constant::Ellipsis),
            TokenKind::Punct("(") => return self.parenthesized(line),
            TokenKind::Punct("[") => {
                let items = self.sequence_items("]")?;
                ExprKind::List(items)
            }
            TokenKind::Punct("{") => return self.braced(line),
            TokenKind::Punct("*") => {
                return Err(SyntaxError::unsupported("starred expressions", line));
            }
            TokenKind::Keyword(Kw::Yield) => {
                return Err(SyntaxError::unsupported("'yield' expressions", line));
            }
            TokenKind::Indent => return Err(SyntaxError::indentation("unexpected indent", line)),
            _ => return Err(SyntaxError::invalid("invalid syntax", line)),
        };
        Ok(Expr::new(kind, line))
    }

    fn string_concat(&mut self, first: Constant) -> ParseResult<Constant> {
        let mut current = first;
        loop {
            let line = self.line();
            current = match (current, &self.peek().kind) {
                (Constant::Str(mut text), TokenKind::Str(next)) => {
                    text.push_str(next);
                    Constant::Str(text)
                }
                (Constant::Bytes(mut bytes), TokenKind::Bytes(next)) => {
                    bytes.extend_from_slice(next);
                    Constant::Bytes(bytes)
                }
                (Constant::Str(_), TokenKind::Bytes(_))
                | (Constant::Bytes(_), TokenKind::Str(_)) => {
                    return Err(SyntaxError::invalid(
                        "cannot mix bytes and nonbytes literals",
                        line,
                    ));
                }
                (_, TokenKind::FString(_)) => {
                    return Err(SyntaxError::unsupported("f-strings", line));
                }
                (done, _) => return Ok(done),
            };
            self.advance();
        }
    }

    fn parenthesized(&mut self, line: usize) -> ParseResult<Expr> {
        if self.eat_punct(")") {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
        }
        let first = self.test()?;
        if self.at_keyword(Kw::For) {
            return Err(SyntaxError::unsupported("comprehensions", self.line()));
        }
        if self.at_punct(":=") {
            return Err(SyntaxError::unsupported("assignment expressions", self.line()));
        }
        if self.eat_punct(")") {
            return Ok(first);
        }
        self.expect_punct(",")?;
        let mut items = vec![first];
        items.extend(self.sequence_items(")")?);
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    /// Comma-separated expressions up to and including `close`.
    fn sequence_items(&mut self, close: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct(close) {
                break;
            }
            items.push(self.test()?);
            if self.at_keyword(Kw::For) {
                return Err(SyntaxError::unsupported("comprehensions", self.line()));
            }
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn braced(&mut self, line: usize) -> ParseResult<Expr> {
        if self.eat_punct("}") {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), line));
        }
        if self.at_punct("**") {
            return Err(SyntaxError::unsupported("dictionary unpacking", line));
        }
        let first = self.test()?;
        if self.at_keyword(Kw::For) {
            return Err(SyntaxError::unsupported("comprehensions", self.line()));
        }
        if !self.eat_punct(":") {
            let mut items = vec![first];
            if self.eat_punct(",") {
                items.extend(self.sequence_items("}")?);
            } else {
                self.expect_punct("}")?;
            }
            return Ok(Expr::new(ExprKind::Set(items), line));
        }

        let mut entries = vec![(first, self.test()?)];
        if self.at_keyword(Kw::For) {
            return Err(SyntaxError::unsupported("comprehensions", self.line()));
        }
        loop {
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
            if self.eat_punct("}") {
                break;
            }
            if self.at_punct("**") {
                return Err(SyntaxError::unsupported("dictionary unpacking", self.line()));
            }
            let key = self.test()?;
            self.expect_punct(":")?;
            let value = self.test()?;
            entries.push((key, value));
        }
        Ok(Expr::new(ExprKind::Dict(entries), line))
    }
}

fn check_single_target(expr: &Expr) -> ParseResult<()> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(_) | ExprKind::List(_) => Err(SyntaxError::invalid(
            "only single target (not tuple) can be annotated",
            expr.line,
        )),
        _ => Err(SyntaxError::invalid(
            "illegal target for annotation",
            expr.line,
        )),
    }
}

fn check_target(expr: &Expr) -> ParseResult<()> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().try_for_each(check_target),
        ExprKind::Constant(_) => Err(SyntaxError::invalid("cannot assign to literal", expr.line)),
        ExprKind::Call { .. } => Err(SyntaxError::invalid(
            "cannot assign to function call here. Maybe you meant '==' instead of '='?",
            expr.line,
        )),
        _ => Err(SyntaxError::invalid("cannot assign to expression", expr.line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module(source, 64).expect("source should parse")
    }

    #[test]
    fn class_with_fields_and_methods() {
        let module = parse(
            "class User(BaseModel):\n    \"\"\"A user.\"\"\"\n    name: str\n    age: int = Field(0, ge=0)\n\n    @field_validator('name')\n    @classmethod\n    def check(cls, v):\n        for c in v:\n            pass\n        return v\n",
        );
        let [stmt] = module.body.as_slice() else {
            panic!("expected a single statement");
        };
        let StmtKind::ClassDef(class) = &stmt.kind else {
            panic!("expected class");
        };
        assert_eq!(class.name, "User");
        assert_eq!(class.body.len(), 4);
        let StmtKind::FunctionDef(func) = &class.body[3].kind else {
            panic!("expected function");
        };
        assert_eq!(func.decorators.len(), 2);
        assert_eq!(func.params, vec!["cls", "v"]);
    }

    #[test]
    fn function_bodies_may_use_unsupported_statements() {
        let module = parse("def f(x):\n    while x:\n        x = f'{x}'\n    return x\nclass A: pass\n");
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn chained_assignment_and_unpacking() {
        let module = parse("a = b = 1\nc, d = 1, 2\n");
        let StmtKind::Assign { targets, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets.len(), 2);
        let StmtKind::Assign { targets, value } = &module.body[1].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(targets[0].kind, ExprKind::Tuple(_)));
        assert!(matches!(value.kind, ExprKind::Tuple(_)));
    }

    #[test]
    fn from_import_forms() {
        let module = parse("from typing import (Optional,\n    List as L,)\nfrom pydantic import *\n");
        let StmtKind::ImportFrom { names, .. } = &module.body[0].kind else {
            panic!("expected import");
        };
        let ImportTargets::Names(names) = names else {
            panic!("expected names");
        };
        assert_eq!(names[1].asname.as_deref(), Some("L"));
        assert!(matches!(
            module.body[1].kind,
            StmtKind::ImportFrom {
                names: ImportTargets::Star,
                ..
            }
        ));
    }

    #[test]
    fn operator_precedence() {
        let expr = parse_expression("1 + 2 * 3 | None", 64).expect("parses");
        let ExprKind::BinOp { op, left, .. } = expr.kind else {
            panic!("expected binop");
        };
        assert_eq!(op, BinOp::BitOr);
        assert!(matches!(left.kind, ExprKind::BinOp { op: BinOp::Add, .. }));
    }

    #[test]
    fn subscript_tuple_index() {
        let expr = parse_expression("Dict[str, int]", 64).expect("parses");
        let ExprKind::Subscript { index, .. } = expr.kind else {
            panic!("expected subscript");
        };
        assert!(matches!(index.kind, ExprKind::Tuple(ref items) if items.len() == 2));
    }

    #[test]
    fn lambda_is_opaque() {
        let expr = parse_expression("lambda: [1, 2]", 64).expect("parses");
        assert!(matches!(expr.kind, ExprKind::Lambda(_)));
    }

    #[test]
    fn loops_are_rejected_with_line() {
        let err = parse_module("x = 1\nfor i in x:\n    pass\n", 64).unwrap_err();
        assert_eq!(err.message, "unsupported syntax: 'for' statement");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn comprehensions_are_rejected() {
        let err = parse_module("x = [i for i in y]\n", 64).unwrap_err();
        assert_eq!(err.message, "unsupported syntax: comprehensions");
    }

    #[test]
    fn missing_colon() {
        let err = parse_module("class A\n    x: int\n", 64).unwrap_err();
        assert_eq!(err.to_string(), "expected ':' (<string>, line 1)");
    }

    #[test]
    fn nesting_budget_is_enforced() {
        let source = format!("x = {}1{}\n", "(".repeat(100), ")".repeat(100));
        let err = parse_module(&source, 32).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::NestingLimit(32));
    }

    #[test]
    fn missing_block_is_indentation_error() {
        let err = parse_module("class A:\nx = 1\n", 64).unwrap_err();
        assert_eq!(err.class_name(), "IndentationError");
    }
}
