// Precedence-climbing parser for the expression language

use super::ast::{BinOp, Expr, KeyPath, UnaryOp};
use super::lexer::{tokenize, SpannedToken, Token};
use super::value::{parse_date, parse_datetime, parse_time, Value};
use super::Error;

/// Syntax error naming what the parser expected and what it found
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Syntax error at position {pos}: expected {expected}, found {found}")]
pub struct SyntaxError {
    pub pos: usize,
    pub expected: String,
    pub found: String,
}

/// Parser over a token vector
pub struct Parser<'t> {
    tokens: &'t [SpannedToken],
    index: usize,
    /// Whether a comma after a comparison continues a chain. Off inside
    /// argument lists and list literals, where commas separate items.
    allow_chain: bool,
}

impl<'t> Parser<'t> {
    /// Create a new parser over tokens produced by the lexer
    pub fn new(tokens: &'t [SpannedToken]) -> Self {
        Parser {
            tokens,
            index: 0,
            allow_chain: true,
        }
    }

    fn peek(&self, n: usize) -> &Token {
        self.tokens
            .get(self.index + n)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn current(&self) -> &Token {
        self.peek(0)
    }

    /// Character offset of the current token
    fn pos(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }

    fn error(&self, expected: impl Into<String>) -> SyntaxError {
        SyntaxError {
            pos: self.pos(),
            expected: expected.into(),
            found: format!("'{}'", self.current()),
        }
    }

    /// Check if current token matches expected, and advance if so
    fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        if *self.current() != expected {
            return Err(self.error(format!("'{}'", expected)));
        }
        self.advance();
        Ok(())
    }

    /// Run `f` with chain sugar switched on or off, restoring it afterwards
    fn with_chain<T>(
        &mut self,
        allow: bool,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        let saved = self.allow_chain;
        self.allow_chain = allow;
        let result = f(self);
        self.allow_chain = saved;
        result
    }

    /// Parse an expression (entry point)
    pub fn parse(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_or_expr()?;

        // Ensure we've consumed all input
        if *self.current() != Token::Eof {
            return Err(self.error("end of input"));
        }

        Ok(expr)
    }

    /// or_expr ::= and_expr ("|" and_expr)*
    fn parse_or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and_expr()?;

        while *self.current() == Token::OpOr {
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(BinOp::Or, left, right);
        }

        Ok(left)
    }

    /// and_expr ::= equality ("&" equality)*
    fn parse_and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_equality()?;

        while *self.current() == Token::OpAnd {
            self.advance();
            let right = self.parse_equality()?;
            left = binary(BinOp::And, left, right);
        }

        Ok(left)
    }

    /// equality ::= relational (eq_op relational ("," relational)*)*
    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_relational()?;

        while let Some(op) = equality_op(self.current()) {
            self.advance();
            left = self.parse_comparison_rhs(op, left, Self::parse_relational)?;
        }

        Ok(left)
    }

    /// relational ::= additive (rel_op additive ("," additive)*)*
    fn parse_relational(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_additive()?;

        while let Some(op) = relational_op(self.current()) {
            self.advance();
            left = self.parse_comparison_rhs(op, left, Self::parse_additive)?;
        }

        Ok(left)
    }

    /// Parse the right side of a comparison, folding `a OP b, c, d` into a
    /// chain
    fn parse_comparison_rhs(
        &mut self,
        op: BinOp,
        left: Expr,
        operand: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let first = operand(self)?;
        if !(self.allow_chain && *self.current() == Token::Comma) {
            return Ok(binary(op, left, first));
        }

        let mut rights = vec![first];
        while *self.current() == Token::Comma {
            self.advance();
            rights.push(operand(self)?);
        }

        Ok(Expr::ChainCompare {
            op,
            left: Box::new(left),
            rights,
        })
    }

    /// additive ::= multiplicative (("+" | "-") multiplicative)*
    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current() {
                Token::OpAdd => BinOp::Add,
                Token::OpSub => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    /// multiplicative ::= unary (("*" | "/") unary)*
    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current() {
                Token::OpMul => BinOp::Mul,
                Token::OpDiv => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    /// unary ::= ("!" | "-") unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.current() {
            Token::OpNot => UnaryOp::Not,
            Token::OpSub => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// postfix ::= primary ("." ident "(" args ")")*
    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;

        while *self.current() == Token::Dot {
            let name = match (self.peek(1), self.peek(2)) {
                (Token::Ident(name), Token::LParen) => name.clone(),
                _ => {
                    self.advance();
                    return Err(self.error("method call"));
                }
            };
            self.advance(); // .
            self.advance(); // name
            let mut args = vec![expr];
            args.extend(self.parse_args()?);
            expr = Expr::FuncCall { name, args };
        }

        Ok(expr)
    }

    /// primary ::= literal | ident | func_call | locator | list | "(" expr ")"
    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let literal = match self.current() {
            Token::Number(n) => Some(Value::Number(*n)),
            Token::String(s) => Some(Value::String(s.clone())),
            Token::Date(s) => parse_date(s).map(Value::Date),
            Token::Time(s) => parse_time(s).map(Value::Time),
            Token::DateTime(s) => parse_datetime(s).map(Value::DateTime),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::Literal(value));
        }

        match self.current().clone() {
            Token::Ident(name) => {
                self.advance();
                if *self.current() == Token::LParen {
                    let args = self.parse_args()?;
                    return Ok(Expr::FuncCall { name, args });
                }
                let path = self.parse_key_path(name);
                Ok(Expr::Ident(path))
            }

            Token::At => {
                self.advance();
                let table = match self.current() {
                    Token::Ident(name) => name.clone(),
                    _ => return Err(self.error("table name after '@'")),
                };
                self.advance();
                self.expect(Token::LBracket)?;
                let key = self.with_chain(true, Self::parse_or_expr)?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Locator {
                    table,
                    key: Box::new(key),
                })
            }

            Token::LParen => {
                self.advance();
                let expr = self.with_chain(true, Self::parse_or_expr)?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::LBracket => {
                self.advance();
                let items = self.with_chain(false, |p| p.parse_items(Token::RBracket))?;
                Ok(Expr::List(items))
            }

            _ => Err(self.error("value")),
        }
    }

    /// Continue a key path after its first segment. A segment followed by
    /// "(" is left for the method-call postfix.
    fn parse_key_path(&mut self, first: String) -> KeyPath {
        let mut segments = vec![first];

        while *self.current() == Token::Dot {
            match (self.peek(1), self.peek(2)) {
                (Token::Ident(_), Token::LParen) => break,
                (Token::Ident(segment), _) => {
                    segments.push(segment.clone());
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }

        KeyPath::new(segments)
    }

    /// args ::= "(" (expr ("," expr)*)? ")"
    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(Token::LParen)?;
        self.with_chain(false, |p| p.parse_items(Token::RParen))
    }

    /// Comma-separated expressions up to and including `close`
    fn parse_items(&mut self, close: Token) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();

        // Check for empty list
        if *self.current() == close {
            self.advance();
            return Ok(items);
        }

        loop {
            items.push(self.parse_or_expr()?);

            if *self.current() == Token::Comma {
                self.advance();
            } else if *self.current() == close {
                self.advance();
                break;
            } else {
                return Err(self.error(format!("',' or '{}'", close)));
            }
        }

        Ok(items)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn equality_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::OpEq => Some(BinOp::Eq),
        Token::OpNeq => Some(BinOp::Neq),
        Token::OpMatch => Some(BinOp::Match),
        Token::OpNotMatch => Some(BinOp::NotMatch),
        Token::OpMatchCase => Some(BinOp::MatchCase),
        Token::OpNotMatchCase => Some(BinOp::NotMatchCase),
        _ => None,
    }
}

fn relational_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::OpLt => Some(BinOp::Lt),
        Token::OpLe => Some(BinOp::Le),
        Token::OpGt => Some(BinOp::Gt),
        Token::OpGe => Some(BinOp::Ge),
        _ => None,
    }
}

/// Parse a token stream produced by [`tokenize`]
pub fn parse_tokens(tokens: &[SpannedToken]) -> Result<Expr, SyntaxError> {
    Parser::new(tokens).parse()
}

/// Parse an expression from a string
pub fn parse(input: &str) -> Result<Expr, Error> {
    let tokens = tokenize(input)?;
    Ok(parse_tokens(&tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(path: &str) -> Expr {
        Expr::Ident(KeyPath::from(path))
    }

    fn num(n: f64) -> Expr {
        Expr::Literal(Value::Number(n))
    }

    fn syntax_error(input: &str) -> SyntaxError {
        match parse(input) {
            Err(Error::Syntax(err)) => err,
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_comparison() {
        let expr = parse("age >= 18").unwrap();
        assert_eq!(expr, binary(BinOp::Ge, ident("age"), num(18.0)));
    }

    #[test]
    fn test_parse_precedence() {
        // a | b & c == 1 + 2 * 3
        let expr = parse("a | b & c == 1 + 2 * 3").unwrap();
        let product = binary(BinOp::Mul, num(2.0), num(3.0));
        let sum = binary(BinOp::Add, num(1.0), product);
        let eq = binary(BinOp::Eq, ident("c"), sum);
        let and = binary(BinOp::And, ident("b"), eq);
        assert_eq!(expr, binary(BinOp::Or, ident("a"), and));
    }

    #[test]
    fn test_parse_relational_binds_tighter_than_equality() {
        let expr = parse("a < b == c").unwrap();
        let lt = binary(BinOp::Lt, ident("a"), ident("b"));
        assert_eq!(expr, binary(BinOp::Eq, lt, ident("c")));
    }

    #[test]
    fn test_parse_left_associative() {
        let expr = parse("10 - 4 - 3").unwrap();
        let inner = binary(BinOp::Sub, num(10.0), num(4.0));
        assert_eq!(expr, binary(BinOp::Sub, inner, num(3.0)));
    }

    #[test]
    fn test_parse_chain_compare() {
        let expr = parse(r#""another column" <= 10,20,30,99"#).unwrap();

        match expr {
            Expr::ChainCompare { op, left, rights } => {
                assert_eq!(op, BinOp::Le);
                assert_eq!(
                    *left,
                    Expr::Ident(KeyPath::new(vec!["another column".to_string()]))
                );
                assert_eq!(rights, vec![num(10.0), num(20.0), num(30.0), num(99.0)]);
            }
            _ => panic!("Expected ChainCompare"),
        }
    }

    #[test]
    fn test_parse_chain_inside_logic() {
        let expr = parse("x == 1, 2 & y").unwrap();

        match expr {
            Expr::BinaryOp {
                op: BinOp::And,
                left,
                ..
            } => assert!(matches!(*left, Expr::ChainCompare { .. })),
            _ => panic!("Expected And"),
        }
    }

    #[test]
    fn test_parse_commas_separate_arguments() {
        let expr = parse("if(x == 1, 'a', 'b')").unwrap();

        match expr {
            Expr::FuncCall { name, args } => {
                assert_eq!(name, "if");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[0], Expr::BinaryOp { op: BinOp::Eq, .. }));
            }
            _ => panic!("Expected FuncCall"),
        }

        // Parentheses re-enable chains inside arguments
        let expr = parse("if((x == 1, 2), 'a', 'b')").unwrap();
        match expr {
            Expr::FuncCall { args, .. } => {
                assert_eq!(args.len(), 3);
                assert!(matches!(args[0], Expr::ChainCompare { .. }));
            }
            _ => panic!("Expected FuncCall"),
        }
    }

    #[test]
    fn test_parse_key_path_and_method_call() {
        let expr = parse("household.member.name.trim()").unwrap();

        assert_eq!(
            expr,
            Expr::FuncCall {
                name: "trim".to_string(),
                args: vec![ident("household.member.name")],
            }
        );
    }

    #[test]
    fn test_parse_method_call_with_arguments_and_chaining() {
        let expr = parse("name.trim().length()").unwrap();

        assert_eq!(
            expr,
            Expr::FuncCall {
                name: "length".to_string(),
                args: vec![Expr::FuncCall {
                    name: "trim".to_string(),
                    args: vec![ident("name")],
                }],
            }
        );
    }

    #[test]
    fn test_parse_function_call() {
        let expr = parse("coalesce(1, null(), 2)").unwrap();

        match expr {
            Expr::FuncCall { name, args } => {
                assert_eq!(name, "coalesce");
                assert_eq!(args.len(), 3);
                assert_eq!(
                    args[1],
                    Expr::FuncCall {
                        name: "null".to_string(),
                        args: vec![]
                    }
                );
            }
            _ => panic!("Expected FuncCall"),
        }
    }

    #[test]
    fn test_parse_locator() {
        let expr = parse("@people[person_id] == @people[2]").unwrap();

        match expr {
            Expr::BinaryOp { op, left, right } => {
                assert_eq!(op, BinOp::Eq);
                assert_eq!(
                    *left,
                    Expr::Locator {
                        table: "people".to_string(),
                        key: Box::new(ident("person_id")),
                    }
                );
                assert!(matches!(*right, Expr::Locator { .. }));
            }
            _ => panic!("Expected BinaryOp"),
        }
    }

    #[test]
    fn test_parse_list_literal() {
        let expr = parse("sum([0, 1, 2])").unwrap();

        match expr {
            Expr::FuncCall { args, .. } => {
                assert_eq!(args[0], Expr::List(vec![num(0.0), num(1.0), num(2.0)]));
            }
            _ => panic!("Expected FuncCall"),
        }

        assert_eq!(parse("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn test_parse_unary() {
        let expr = parse("!-x").unwrap();

        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(ident("x")),
                }),
            }
        );
    }

    #[test]
    fn test_parse_temporal_literal() {
        let expr = parse("visit > '2015-01-01'").unwrap();

        match expr {
            Expr::BinaryOp { right, .. } => {
                assert!(matches!(*right, Expr::Literal(Value::Date(_))));
            }
            _ => panic!("Expected BinaryOp"),
        }
    }

    #[test]
    fn test_display_round_trip() {
        let sources = [
            "a | b & !c",
            r#""another column" <= 10, 20, 30, 99"#,
            r"if((x == 1, 2), 'it\'s', -y)",
            "@people[id + 1] == @people[2]",
            "x.trim().length() * 2 >= 3",
            "[1, 'two', null()] == [1, 'two', null()]",
            "'some string' !=~~ '^SOME'",
        ];

        for source in sources {
            let expr = parse(source).unwrap();
            let printed = expr.to_string();
            let reparsed = parse(&printed).unwrap();
            assert_eq!(reparsed.to_string(), printed, "source: {}", source);
        }
    }

    #[test]
    fn test_error_unclosed_paren() {
        let err = syntax_error("(age >= 18");
        assert_eq!(err.expected, "')'");
        assert_eq!(err.found, "'end of input'");
    }

    #[test]
    fn test_error_unexpected_token() {
        let err = syntax_error("age >= 18 19");
        assert_eq!(err.expected, "end of input");
        assert_eq!(err.pos, 10);
    }

    #[test]
    fn test_error_missing_operand() {
        let err = syntax_error("age >= ");
        assert_eq!(err.expected, "value");
    }

    #[test]
    fn test_error_bad_locator() {
        let err = syntax_error("@[1]");
        assert!(err.expected.contains("table name"));
    }

    #[test]
    fn test_error_dangling_comma_in_call() {
        let err = syntax_error("sum(1,)");
        assert_eq!(err.expected, "value");
    }

    #[test]
    fn test_lex_error_propagates() {
        assert!(matches!(parse("a # b"), Err(Error::Lex(_))));
    }
}
