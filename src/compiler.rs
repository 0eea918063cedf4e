//! Contains the parser and bytecode compiler.
//!
//! There is no syntax tree: every production emits bytecode into the [Chunk] the moment the Pratt
//! parser recognizes it.
use std::sync::LazyLock;

use enum_map::{enum_map, EnumMap};
use tracing::debug;

use crate::chunk::{Chunk, OpCode};
use crate::error::{CompileError, ErrorLocation, InterpretationError};
use crate::scanner::{Lexeme, Scanner, Token};
use crate::value::Value;

/// How deeply expressions may nest before the compiler gives up.
const MAX_NESTING: usize = 512;

/////////////////////////////////////////// Public API ////////////////////////////////////////////

/// Compiles the given source code and, if successful returns one bytecode [Chunk].
///
/// ```
/// # use lox_arith::compiler::compile;
/// # use lox_arith::chunk::OpCode;
/// let chunk = compile("-1").unwrap();
/// assert_eq!(
///     &[OpCode::Constant as u8, 0, OpCode::Negate as u8, OpCode::Return as u8],
///     chunk.code()
/// );
///
/// assert!(compile("1 +").is_err());
/// ```
#[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
pub fn compile(source: &str) -> crate::Result<Chunk> {
    let parser = Parser::new(source);
    let compiler = Compiler::new(parser);
    compiler.compile()
}

///////////////////////////////////// Implementation details //////////////////////////////////////

/// Precedence rules for [Token]s.
///
/// Precedence rules have a well-defined partial ordering ([PartialOrd]), which is required for use
/// in the Pratt parsing algorithm.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq)]
enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `or`
    Or,
    /// `and`
    And,
    /// `?:`
    Conditional,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// prefix `-`
    Unary,
    /// `^`
    Power,
    /// postfix `!`
    Postfix,
    /// `.` `()`
    Call,
    /// Literals, and groupings
    Primary,
}

/// What to do with a token that starts an expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Prefix {
    Grouping,
    Negate,
    Number,
}

/// What to do with a token that follows a complete operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Infix {
    /// Left-associative `+ - * /`.
    Binary,
    /// Right-associative `^`.
    Power,
    /// Postfix `!`.
    Factorial,
    /// `? :`
    Conditional,
}

/// A rule in the Pratt parser table. See [Compiler::parse_precedence()] for usage.
#[derive(Copy, Clone, Debug)]
struct ParserRule {
    prefix: Option<Prefix>,
    infix: Option<Infix>,
    precedence: Precedence,
}

/// Contains the parser state. For some strange reason, this also includes error status.
#[derive(Debug)]
struct Parser<'a> {
    scanner: Scanner<'a>,
    current: Lexeme<'a>,
    previous: Lexeme<'a>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
}

/// Contains the compiler state, which includes the [Parser] and the current chunk being produced.
struct Compiler<'a> {
    parser: Parser<'a>,
    compiling_chunk: Chunk,
    depth: usize,
}

impl Precedence {
    /// Returns the next higher level of precedence.
    ///
    /// # Panics
    ///
    /// Panics if trying to obtain a higher-level of precedence than the maximum,
    /// [Precedence::Primary], which is the precedence of literals and l-values.
    #[inline]
    fn higher_precedence(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Conditional,
            Conditional => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Power,
            Power => Postfix,
            Postfix => Call,
            Call => Primary,
            Primary => panic!("Tried to get higher precedence than primary"),
        }
    }
}

impl ParserRule {
    /// Returns one level of precedence higher than the rule's precedence.
    /// See [Precedence::higher_precedence()].
    #[inline(always)]
    fn higher_precedence(&self) -> Precedence {
        self.precedence.higher_precedence()
    }
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code. Call [Parser::advance()] to load the first
    /// token.
    fn new(source: &'a str) -> Parser<'a> {
        let scanner = Scanner::new(source);
        let sentinel = scanner.make_sentinel("<before first token>");

        Parser {
            scanner,
            previous: sentinel.clone(),
            current: sentinel,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
        }
    }

    /// Update self.previous and self.current such that they move one token further in the token
    /// stream.
    fn advance(&mut self) {
        self.previous = self.current.clone();

        // Get tokens until we get a non-error token.
        loop {
            self.current = self.scanner.next_token();
            if self.current.token() != Token::Error {
                break;
            }

            self.error_at_current(self.current.text())
        }
    }

    /// Scan the next token. If the token is not of the desired type, an error is reported.
    ///
    /// Finding the token the grammar expects is a synchronization point: panic mode ends here.
    fn consume(&mut self, desired_token: Token, message: &str) {
        if self.check(desired_token) {
            self.panic_mode = false;
            return self.advance();
        }

        self.error_at_current(message);
    }

    /// Return true if the current token is equal to the given token.
    fn check(&self, token: Token) -> bool {
        self.current.token() == token
    }

    /// Report a compile error, located at the previous [Lexeme]. In Pratt parsing, this is the
    /// handler you usually want to call, because the previous lexeme decided which [ParserRule]
    /// was accepted.
    fn error(&mut self, message: &str) {
        self.error_at(self.previous.clone(), message)
    }

    /// Report a compile error, located at the current [Lexeme].
    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current.clone(), message)
    }

    /// Report a compile error, located at the given [Lexeme].
    fn error_at(&mut self, lexeme: Lexeme<'a>, message: &str) {
        // *Attempt* to prevent a deluge of spurious syntax errors:
        if self.panic_mode {
            return;
        }

        self.panic_mode = true;
        self.had_error = true;

        let location = match lexeme.token() {
            Token::Eof => ErrorLocation::AtEnd,
            Token::Error => ErrorLocation::Lexical,
            _ => ErrorLocation::At(lexeme.text().to_owned()),
        };
        let error = CompileError {
            line: lexeme.line(),
            location,
            message: message.to_owned(),
        };
        debug!(%error, "compile error");
        self.errors.push(error);
    }
}

impl<'a> Compiler<'a> {
    /// Creates a new compiler with the given [Parser].
    fn new(parser: Parser<'a>) -> Compiler<'a> {
        Compiler {
            parser,
            compiling_chunk: Chunk::default(),
            depth: 0,
        }
    }

    /// Takes ownership of the compiler, and returns the chunk
    fn compile(mut self) -> crate::Result<Chunk> {
        self.advance();
        self.expression();
        self.parser
            .consume(Token::Eof, "Expect end of expression.");
        self.end_compiler();

        if self.parser.had_error {
            return Err(InterpretationError::CompileError(self.parser.errors));
        }

        debug!(
            bytes = self.compiling_chunk.len(),
            constants = self.compiling_chunk.constants().len(),
            "compiled chunk"
        );
        Ok(self.compiling_chunk)
    }

    /// Signal the end of compilation.
    fn end_compiler(&mut self) {
        self.emit_return();

        // Print a listing of the bytecode to manually inspect compiled output.
        if cfg!(feature = "print_code") && !self.parser.had_error {
            crate::debug::disassemble_chunk(&self.compiling_chunk, "code");
        }
    }

    /// The core of the Pratt parsing algorithm.
    ///
    /// See: <https://en.wikipedia.org/wiki/Operator-precedence_parser#Pratt_parsing>
    fn parse_precedence(&mut self, precedence: Precedence) {
        if self.depth >= MAX_NESTING {
            self.parser.error_at_current("Expression nests too deeply.");
            return;
        }

        self.depth += 1;
        self.parse_operators(precedence);
        self.depth -= 1;
    }

    fn parse_operators(&mut self, precedence: Precedence) {
        self.advance();

        // First, figure out how to parse the prefix.
        let Some(prefix) = self.rule_from_previous().prefix else {
            self.parser.error("Expect expression.");
            return;
        };
        self.prefix(prefix);

        while precedence <= self.rule_from_current().precedence {
            // current is now previous:
            self.advance();
            match self.rule_from_previous().infix {
                Some(infix) => self.infix(infix),
                // Every token with a precedence has an infix rule.
                None => unreachable!("no infix rule for {:?}", self.previous_token()),
            }
        }
    }

    /// Parse an expression.
    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn prefix(&mut self, prefix: Prefix) {
        match prefix {
            Prefix::Grouping => self.grouping(),
            Prefix::Negate => self.unary(),
            Prefix::Number => self.number(),
        }
    }

    fn infix(&mut self, infix: Infix) {
        match infix {
            Infix::Binary => self.binary(),
            Infix::Power => self.power(),
            Infix::Factorial => self.factorial(),
            Infix::Conditional => self.conditional(),
        }
    }

    /// Parse '(' as a prefix. Assumes '(' has been consumed.
    fn grouping(&mut self) {
        debug_assert_eq!(Token::LeftParen, self.previous_token());
        self.expression();
        self.parser
            .consume(Token::RightParen, "Expect ')' after expression.");
    }

    /// Parse a number literal as a prefix. Assumes number has been consumed.
    fn number(&mut self) {
        debug_assert_eq!(Token::Number, self.previous_token());
        match self.parser.previous.text().parse::<f64>() {
            Ok(value) => self.emit_constant(value.into()),
            Err(_) => self.parser.error("Invalid number literal."),
        }
    }

    /// Parse prefix `-`. Assumes the operator has been consumed.
    fn unary(&mut self) {
        let line = self.line_number_of_prefix();

        // Compile the operand, so that it's placed on the stack.
        self.parse_precedence(Precedence::Unary);

        self.emit_instruction_on(OpCode::Negate, line);
    }

    /// Parse a left-associative binary operator as an infix. Assumes the operator has been
    /// consumed.
    fn binary(&mut self) {
        let operator = self.previous_token();
        let line = self.line_number_of_prefix();
        let rule = get_rule(operator);

        self.parse_precedence(rule.higher_precedence());
        let opcode = match operator {
            Token::Plus => OpCode::Add,
            Token::Minus => OpCode::Subtract,
            Token::Star => OpCode::Multiply,
            Token::Slash => OpCode::Divide,
            _ => unreachable!(),
        };
        self.emit_instruction_on(opcode, line);
    }

    /// Parse `^`. The right operand is parsed at the operator's own precedence, so `a ^ b ^ c`
    /// groups as `a ^ (b ^ c)`.
    fn power(&mut self) {
        debug_assert_eq!(Token::Caret, self.previous_token());
        let line = self.line_number_of_prefix();

        self.parse_precedence(Precedence::Power);
        self.emit_instruction_on(OpCode::Exponentiate, line);
    }

    /// Parse postfix `!`. The operand is already on the stack.
    fn factorial(&mut self) {
        debug_assert_eq!(Token::Bang, self.previous_token());
        self.emit_instruction(OpCode::Factorial);
    }

    /// Parse `condition ? then : else`. The condition is already on the stack.
    ///
    /// ```text
    ///        condition
    ///        BRANCH_IF_FALSY --+
    ///        then              |
    ///   +--- JUMP              |
    ///   |    else  <-----------+
    ///   +--> ...
    /// ```
    fn conditional(&mut self) {
        debug_assert_eq!(Token::Question, self.previous_token());

        let else_jump = self.emit_jump(OpCode::BranchIfFalsy);
        self.parse_precedence(Precedence::Conditional);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);

        self.parser.consume(
            Token::Colon,
            "Expect ':' after then branch of conditional expression.",
        );
        self.parse_precedence(Precedence::Conditional);
        self.patch_jump(end_jump);
    }

    /// Appends [OpCode::Return] to current [Chunk].
    fn emit_return(&mut self) {
        self.emit_instruction(OpCode::Return);
    }

    /// Adds a constant to the current [Chunk] and the instruction that loads it.
    ///
    /// # Error
    ///
    /// When the constant pool is full, this signals a compiler error. The current [Chunk] can still
    /// be appended to, however, it is invalid, and will not be returned as a valid program.
    fn emit_constant(&mut self, value: Value) {
        let line = self.line_number_of_prefix();
        if self.current_chunk().write_constant(value, line).is_none() {
            self.parser.error("Too many constants in one chunk.");
        }
    }

    /// Writes a jump with a placeholder operand. Returns the operand's offset for
    /// [Compiler::patch_jump()].
    fn emit_jump(&mut self, opcode: OpCode) -> usize {
        let line = self.line_number_of_prefix();
        self.current_chunk()
            .write_opcode(opcode, line)
            .with_jump_placeholder()
    }

    /// Makes the jump at `operand_offset` land on the next instruction to be written.
    fn patch_jump(&mut self, operand_offset: usize) {
        if self.current_chunk().patch_jump(operand_offset).is_none() {
            self.parser.error("Too much code to jump over.");
        }
    }

    /// Writes an [OpCode] to the current [Chunk], attributed to the previous token's line.
    fn emit_instruction(&mut self, opcode: OpCode) {
        let line = self.line_number_of_prefix();
        self.emit_instruction_on(opcode, line);
    }

    /// Writes an [OpCode] to the current [Chunk], attributed to the given line.
    fn emit_instruction_on(&mut self, opcode: OpCode, line: usize) {
        self.current_chunk().write_opcode(opcode, line);
    }

    ///////////////////////////////////////// Aliases /////////////////////////////////////////////

    /// Returns the current [Chunk].
    #[inline(always)]
    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.compiling_chunk
    }

    /// Advance one token in scanner, such that:
    /// ```text
    /// (previous, current) = (current, scanner.next_token())
    /// ```
    #[inline(always)]
    fn advance(&mut self) {
        self.parser.advance()
    }

    /// Returns the line number of the prefix token, a.k.a., `self.parser.previous`.
    #[inline(always)]
    fn line_number_of_prefix(&self) -> usize {
        self.parser.previous.line()
    }

    /// Returns the rule of the token in the process of being parsed.
    #[inline(always)]
    fn rule_from_previous(&self) -> ParserRule {
        get_rule(self.previous_token())
    }

    /// Returns the rule of the token that comes next.
    #[inline(always)]
    fn rule_from_current(&self) -> ParserRule {
        get_rule(self.parser.current.token())
    }

    /// Return the token (type) of the previous value. This is useful in prefix parser functions.
    #[inline(always)]
    fn previous_token(&self) -> Token {
        self.parser.previous.token()
    }
}

////////////////////////////////////////// Parser rules ///////////////////////////////////////////

/// Makes defining [ParserRule]s a bit cleaner looking.
macro_rules! rule {
    ($prefix:expr, $infix:expr, $precedence:expr) => {
        ParserRule {
            prefix: $prefix,
            infix: $infix,
            precedence: $precedence,
        }
    };
}

/// The parsing table, built once and shared read-only.
#[rustfmt::skip]
static RULES: LazyLock<EnumMap<Token, ParserRule>> = LazyLock::new(|| {
    use Infix::*;
    use Prefix::*;
    enum_map! {
        //                            Prefix          Infix              Precedence
        Token::LeftParen    => rule!{ Some(Grouping), None,              Precedence::None },
        Token::RightParen   => rule!{ None,           None,              Precedence::None },
        Token::LeftBrace    => rule!{ None,           None,              Precedence::None },
        Token::RightBrace   => rule!{ None,           None,              Precedence::None },
        Token::Comma        => rule!{ None,           None,              Precedence::None },
        Token::Dot          => rule!{ None,           None,              Precedence::None },
        Token::Minus        => rule!{ Some(Negate),   Some(Binary),      Precedence::Term },
        Token::Plus         => rule!{ None,           Some(Binary),      Precedence::Term },
        Token::Semicolon    => rule!{ None,           None,              Precedence::None },
        Token::Star         => rule!{ None,           Some(Binary),      Precedence::Factor },
        Token::Slash        => rule!{ None,           Some(Binary),      Precedence::Factor },
        Token::Question     => rule!{ None,           Some(Conditional), Precedence::Conditional },
        Token::Colon        => rule!{ None,           None,              Precedence::None },
        Token::Caret        => rule!{ None,           Some(Power),       Precedence::Power },
        Token::Bang         => rule!{ None,           Some(Factorial),   Precedence::Postfix },
        Token::BangEqual    => rule!{ None,           None,              Precedence::None },
        Token::Equal        => rule!{ None,           None,              Precedence::None },
        Token::EqualEqual   => rule!{ None,           None,              Precedence::None },
        Token::Greater      => rule!{ None,           None,              Precedence::None },
        Token::GreaterEqual => rule!{ None,           None,              Precedence::None },
        Token::Less         => rule!{ None,           None,              Precedence::None },
        Token::LessEqual    => rule!{ None,           None,              Precedence::None },
        Token::Identifier   => rule!{ None,           None,              Precedence::None },
        Token::StrLiteral   => rule!{ None,           None,              Precedence::None },
        Token::Number       => rule!{ Some(Number),   None,              Precedence::None },
        Token::And          => rule!{ None,           None,              Precedence::None },
        Token::Class        => rule!{ None,           None,              Precedence::None },
        Token::Else         => rule!{ None,           None,              Precedence::None },
        Token::False        => rule!{ None,           None,              Precedence::None },
        Token::For          => rule!{ None,           None,              Precedence::None },
        Token::Fun          => rule!{ None,           None,              Precedence::None },
        Token::If           => rule!{ None,           None,              Precedence::None },
        Token::Nil          => rule!{ None,           None,              Precedence::None },
        Token::Or           => rule!{ None,           None,              Precedence::None },
        Token::Print        => rule!{ None,           None,              Precedence::None },
        Token::Return       => rule!{ None,           None,              Precedence::None },
        Token::Super        => rule!{ None,           None,              Precedence::None },
        Token::This         => rule!{ None,           None,              Precedence::None },
        Token::True         => rule!{ None,           None,              Precedence::None },
        Token::Var          => rule!{ None,           None,              Precedence::None },
        Token::While        => rule!{ None,           None,              Precedence::None },
        Token::Error        => rule!{ None,           None,              Precedence::None },
        Token::Eof          => rule!{ None,           None,              Precedence::None },
    }
});

#[inline]
fn get_rule(token: Token) -> ParserRule {
    RULES[token]
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////
