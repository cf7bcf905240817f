use super::SyntaxError;
use super::token::{Keyword, PUNCTUATION, Token, TokenKind};

const TAB_SIZE: usize = 8;

/// Split source text into tokens, producing INDENT/DEDENT/NEWLINE tokens the
/// way the block-structured grammar expects.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Open brackets with the line they were opened on.
    brackets: Vec<(char, usize)>,
    at_line_start: bool,
}

enum Literal {
    Text(String),
    Binary(Vec<u8>),
}

impl Literal {
    fn push_char(&mut self, ch: char, line: usize) -> Result<(), SyntaxError> {
        match self {
            Self::Text(text) => text.push(ch),
            Self::Binary(bytes) => {
                let byte = u8::try_from(u32::from(ch))
                    .ok()
                    .filter(u8::is_ascii)
                    .ok_or_else(|| {
                        SyntaxError::invalid(
                            "bytes can only contain ASCII literal characters",
                            line,
                        )
                    })?;
                bytes.push(byte);
            }
        }
        Ok(())
    }

    fn push_code(&mut self, code: u32, line: usize) -> Result<(), SyntaxError> {
        match self {
            Self::Text(text) => {
                let ch = char::from_u32(code).ok_or_else(|| {
                    SyntaxError::invalid("(unicode error) illegal Unicode character", line)
                })?;
                text.push(ch);
            }
            Self::Binary(bytes) => {
                let byte = u8::try_from(code)
                    .map_err(|_| SyntaxError::invalid("invalid \\x escape", line))?;
                bytes.push(byte);
            }
        }
        Ok(())
    }
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(kind, self.line));
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                if !self.handle_indentation()? {
                    break;
                }
                continue;
            }

            let Some(ch) = self.peek() else { break };
            match ch {
                ' ' | '\t' | '\x0c' => {
                    self.pos += 1;
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\n') => {
                            self.pos += 1;
                            self.line += 1;
                        }
                        Some('\r') => {
                            self.pos += 1;
                            if self.peek() == Some('\n') {
                                self.pos += 1;
                            }
                            self.line += 1;
                        }
                        _ => {
                            return Err(SyntaxError::invalid(
                                "unexpected character after line continuation character",
                                self.line,
                            ));
                        }
                    }
                }
                '\n' | '\r' => {
                    self.consume_line_break();
                    if self.brackets.is_empty() {
                        self.end_logical_line();
                        self.at_line_start = true;
                    }
                }
                '"' | '\'' => self.lex_string(false, false, false)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|next| next.is_ascii_digit()) => {
                    self.lex_number()?;
                }
                c if c == '_' || c.is_alphabetic() => self.lex_name()?,
                _ => self.lex_punct()?,
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(SyntaxError::invalid(
                format!("'{open}' was never closed"),
                *line,
            ));
        }

        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::EndOfFile);
        Ok(self.tokens)
    }

    fn end_logical_line(&mut self) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|token| !matches!(token.kind, TokenKind::Newline | TokenKind::Dedent));
        if needs_newline {
            self.push(TokenKind::Newline);
        }
    }

    fn consume_line_break(&mut self) {
        if self.bump() == Some('\r') && self.peek() == Some('\n') {
            self.pos += 1;
        }
        self.line += 1;
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Measure leading whitespace of a physical line. Returns `false` at end
    /// of input.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut column = 0usize;
        loop {
            match self.peek() {
                Some(' ') => column += 1,
                Some('\t') => column = (column / TAB_SIZE + 1) * TAB_SIZE,
                Some('\x0c') => column = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('#') => {
                self.skip_comment();
                return Ok(true);
            }
            Some('\n' | '\r') => {
                self.consume_line_break();
                return Ok(true);
            }
            Some('\\') => {
                // A continuation on an otherwise empty line joins with the next one.
                self.at_line_start = false;
                return Ok(true);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);
        if column > current {
            if self.tokens.is_empty() {
                return Err(SyntaxError::indentation("unexpected indent", self.line));
            }
            self.indents.push(column);
            self.push(TokenKind::Indent);
        } else if column < current {
            while self.indents.last().is_some_and(|&level| level > column) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != column {
                return Err(SyntaxError::indentation(
                    "unindent does not match any outer indentation level",
                    self.line,
                ));
            }
        }
        Ok(true)
    }

    fn lex_name(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch == '_' || ch.is_alphanumeric())
        {
            self.pos += 1;
        }
        let ident: String = self.chars.get(start..self.pos).unwrap_or_default().iter().collect();

        if matches!(self.peek(), Some('"' | '\'')) {
            let lowered = ident.to_ascii_lowercase();
            let prefix_ok = lowered.len() <= 2
                && lowered.chars().all(|ch| matches!(ch, 'r' | 'b' | 'u' | 'f'))
                && !matches!(
                    lowered.as_str(),
                    "rr" | "bb" | "uu" | "ff" | "bu" | "ub" | "ur" | "ru" | "uf" | "fu" | "bf" | "fb"
                );
            if prefix_ok {
                if lowered.contains('f') {
                    // Kept opaque: only an error if the parser meets it outside a function body.
                    return self.lex_string(true, false, true);
                }
                return self.lex_string(lowered.contains('r'), lowered.contains('b'), false);
            }
        }

        match Keyword::from_ident(&ident) {
            Some(keyword) => self.push(TokenKind::Keyword(keyword)),
            None => self.push(TokenKind::Name(ident)),
        }
        Ok(())
    }

    fn lex_string(&mut self, raw: bool, binary: bool, formatted: bool) -> Result<(), SyntaxError> {
        let start_line = self.line;
        let Some(quote) = self.bump() else {
            return Err(SyntaxError::invalid("unterminated string literal", start_line));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }

        let mut literal = if binary {
            Literal::Binary(Vec::new())
        } else {
            Literal::Text(String::new())
        };

        let unterminated = |line: usize| {
            if triple {
                SyntaxError::invalid(
                    format!("unterminated triple-quoted string literal (detected at line {line})"),
                    start_line,
                )
            } else {
                SyntaxError::invalid(
                    format!("unterminated string literal (detected at line {line})"),
                    start_line,
                )
            }
        };

        loop {
            let Some(ch) = self.bump() else {
                return Err(unterminated(self.line));
            };
            match ch {
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.pos += 2;
                        break;
                    }
                    literal.push_char(c, self.line)?;
                }
                '\n' | '\r' => {
                    if !triple {
                        return Err(unterminated(self.line));
                    }
                    if ch == '\r' && self.peek() == Some('\n') {
                        self.pos += 1;
                    }
                    self.line += 1;
                    literal.push_char('\n', self.line)?;
                }
                '\\' => {
                    if raw {
                        literal.push_char('\\', self.line)?;
                        if let Some(next) = self.bump() {
                            if next == '\n' {
                                self.line += 1;
                            }
                            literal.push_char(next, self.line)?;
                        }
                    } else {
                        self.lex_escape(&mut literal, binary)?;
                    }
                }
                other => literal.push_char(other, self.line)?,
            }
        }

        match literal {
            Literal::Text(text) if formatted => self
                .tokens
                .push(Token::new(TokenKind::FString(text), start_line)),
            Literal::Text(text) => self.tokens.push(Token::new(TokenKind::Str(text), start_line)),
            Literal::Binary(bytes) => self
                .tokens
                .push(Token::new(TokenKind::Bytes(bytes), start_line)),
        }
        Ok(())
    }

    fn lex_escape(&mut self, literal: &mut Literal, binary: bool) -> Result<(), SyntaxError> {
        let line = self.line;
        let Some(ch) = self.bump() else {
            return Err(SyntaxError::invalid("unterminated string literal", line));
        };
        match ch {
            '\n' => self.line += 1,
            '\r' => {
                if self.peek() == Some('\n') {
                    self.pos += 1;
                }
                self.line += 1;
            }
            '\\' | '\'' | '"' => literal.push_char(ch, line)?,
            'a' => literal.push_code(0x07, line)?,
            'b' => literal.push_code(0x08, line)?,
            'f' => literal.push_code(0x0c, line)?,
            'n' => literal.push_code(0x0a, line)?,
            'r' => literal.push_code(0x0d, line)?,
            't' => literal.push_code(0x09, line)?,
            'v' => literal.push_code(0x0b, line)?,
            '0'..='7' => {
                let mut code = ch.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|next| next.to_digit(8)) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                literal.push_code(code, line)?;
            }
            'x' => {
                let code = self.hex_digits(2, "\\xXX")?;
                literal.push_code(code, line)?;
            }
            'u' if !binary => {
                let code = self.hex_digits(4, "\\uXXXX")?;
                literal.push_code(code, line)?;
            }
            'U' if !binary => {
                let code = self.hex_digits(8, "\\UXXXXXXXX")?;
                literal.push_code(code, line)?;
            }
            other => {
                literal.push_char('\\', line)?;
                literal.push_char(other, line)?;
            }
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, form: &str) -> Result<u32, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .peek()
                .and_then(|ch| ch.to_digit(16))
                .ok_or_else(|| {
                    SyntaxError::invalid(
                        format!("(unicode error) truncated {form} escape"),
                        self.line,
                    )
                })?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        Ok(code)
    }

    fn take_digits(&mut self, radix: u32) -> Result<String, SyntaxError> {
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if ch == '_' {
                if !self.peek_at(1).is_some_and(|next| next.is_digit(radix)) {
                    return Err(SyntaxError::invalid("invalid decimal literal", self.line));
                }
                self.pos += 1;
                continue;
            }
            if !ch.is_digit(radix) {
                break;
            }
            digits.push(ch);
            self.pos += 1;
        }
        Ok(digits)
    }

    fn lex_number(&mut self) -> Result<(), SyntaxError> {
        let line = self.line;
        let prefixed_radix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => Some((16, "hexadecimal")),
            (Some('0'), Some('o' | 'O')) => Some((8, "octal")),
            (Some('0'), Some('b' | 'B')) => Some((2, "binary")),
            _ => None,
        };

        if let Some((radix, name)) = prefixed_radix {
            self.pos += 2;
            if self.peek() == Some('_') {
                self.pos += 1;
            }
            let digits = self.take_digits(radix)?;
            if digits.is_empty() || self.peek().is_some_and(char::is_alphanumeric) {
                return Err(SyntaxError::invalid(format!("invalid {name} literal"), line));
            }
            let value = i128::from_str_radix(&digits, radix)
                .map_err(|_| SyntaxError::invalid("integer literal too large", line))?;
            self.push(TokenKind::Int(value));
            return Ok(());
        }

        let mut text = self.take_digits(10)?;
        let integral_len = text.len();
        let mut is_float = false;

        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            text.push('.');
            text.push_str(&self.take_digits(10)?);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1);
            let digit_at = if matches!(sign, Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|ch| ch.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.pos += 1;
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.pos += 1;
                }
                text.push_str(&self.take_digits(10)?);
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(SyntaxError::unsupported("complex literals", line));
        }
        if self.peek().is_some_and(|ch| ch == '_' || ch.is_alphabetic()) {
            return Err(SyntaxError::invalid("invalid decimal literal", line));
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| SyntaxError::invalid("invalid decimal literal", line))?;
            self.push(TokenKind::Float(value));
        } else {
            if integral_len > 1 && text.starts_with('0') && text.chars().any(|ch| ch != '0') {
                return Err(SyntaxError::invalid(
                    "leading zeros in decimal integer literals are not permitted; use an 0o prefix for octal integers",
                    line,
                ));
            }
            let value: i128 = text
                .parse()
                .map_err(|_| SyntaxError::invalid("integer literal too large", line))?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn lex_punct(&mut self) -> Result<(), SyntaxError> {
        let line = self.line;
        let matched = PUNCTUATION.iter().copied().find(|candidate| {
            candidate
                .chars()
                .enumerate()
                .all(|(offset, ch)| self.peek_at(offset) == Some(ch))
        });
        let Some(punct) = matched else {
            let ch = self.peek().unwrap_or('\0');
            return Err(SyntaxError::invalid(
                format!("invalid character '{ch}' (U+{:04X})", u32::from(ch)),
                line,
            ));
        };
        self.pos += punct.chars().count();

        match punct {
            "(" | "[" | "{" => {
                let open = punct.chars().next().unwrap_or('(');
                self.brackets.push((open, line));
            }
            ")" | "]" | "}" => {
                let expected = match punct {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, _)) => {
                        return Err(SyntaxError::invalid(
                            format!(
                                "closing parenthesis '{punct}' does not match opening parenthesis '{open}'"
                            ),
                            line,
                        ));
                    }
                    None => {
                        return Err(SyntaxError::invalid(format!("unmatched '{punct}'"), line));
                    }
                }
            }
            _ => {}
        }
        self.push(TokenKind::Punct(punct));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("source should tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn indentation_produces_block_tokens() {
        let tokens = kinds("class A:\n    x: int\n\ny = 1\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Name("A".into()),
                TokenKind::Punct(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("x".into()),
                TokenKind::Punct(":"),
                TokenKind::Name("int".into()),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("y".into()),
                TokenKind::Punct("="),
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn brackets_join_physical_lines() {
        let tokens = kinds("x = Field(\n    1,\n    description='a'\n)\n");
        assert!(!tokens[..tokens.len() - 2].contains(&TokenKind::Newline));
    }

    #[test]
    fn string_prefixes_and_escapes() {
        assert_eq!(
            kinds(r#"a = r'\d+' 'x\n' b'\x41'"#)[2..5],
            [
                TokenKind::Str("\\d+".into()),
                TokenKind::Str("x\n".into()),
                TokenKind::Bytes(vec![0x41]),
            ]
        );
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let tokens = tokenize("'''one\ntwo'''\nx = 1\n").expect("tokenize");
        assert_eq!(tokens[0].kind, TokenKind::Str("one\ntwo".into()));
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            kinds("0x1F 0o17 0b101 1_000 2.5 1e3")[..6],
            [
                TokenKind::Int(31),
                TokenKind::Int(15),
                TokenKind::Int(5),
                TokenKind::Int(1000),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0),
            ]
        );
    }

    #[test]
    fn integer_literals_wider_than_64_bits() {
        assert_eq!(
            kinds("99999999999999999999999 0x1_0000_0000_0000_0000")[..2],
            [
                TokenKind::Int(99_999_999_999_999_999_999_999),
                TokenKind::Int(18_446_744_073_709_551_616),
            ]
        );
        assert!(tokenize(&"9".repeat(40)).is_err());
    }

    #[test]
    fn f_strings_are_kept_opaque() {
        assert_eq!(
            kinds("x = f'{y!r}'")[2],
            TokenKind::FString("{y!r}".into())
        );
    }

    #[test]
    fn inconsistent_dedent_is_an_indentation_error() {
        let err = tokenize("if x:\n        a = 1\n    b = 2\n").unwrap_err();
        assert_eq!(err.class_name(), "IndentationError");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn unclosed_bracket_reports_opening_line() {
        let err = tokenize("x = [\n1,\n").unwrap_err();
        assert_eq!(err.message, "'[' was never closed");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert!(err.message.starts_with("unterminated string literal"));
    }
}
