//! Assembly language parser and bytecode compiler.
//!
//! Converts human-readable assembly source into a program image.
//! Uses [`for_each_instruction!`](for_each_instruction) to generate
//! `parse_instruction`, which emits through the
//! [`ProgramBuilder`](super::builder::ProgramBuilder) methods.
//!
//! # Syntax
//!
//! ```text
//! label:
//!     INSTRUCTION operand1, operand2, ...  # optional comment
//!     .directive arguments
//! ```
//!
//! - Instructions are uppercase (e.g., `WRITE_REGISTER`, `OPERATE`)
//! - Registers use `r` prefix (e.g., `r0`, `r255`)
//! - Immediates are decimal or `0x` hexadecimal; negative decimals wrap
//! - `OPERATE` and `SYSCALL` selectors also accept mnemonics (`ADD`, `WRITE`)
//! - `@label` is the label's byte offset from the start of the image
//! - Comments start with `#`
//! - Commas between operands are optional
//!
//! # Directives
//!
//! - `.bytes "text" 0x0a ...`: raw bytes from string literals (escapes `\n`,
//!   `\t`, `\r`, `\0`, `\\`, `\"`) and byte values
//! - `.zero N`: `N` zero bytes
//! - `.org N`: zero fill up to absolute offset `N`

use crate::for_each_instruction;
use crate::virtual_machine::builder::ProgramBuilder;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Operation, Syscall};
use crate::virtual_machine::limits::MAX_IMAGE_SIZE;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const LABEL_PREFIX: char = '@';
const DIRECTIVE_PREFIX: char = '.';

/// Line, column and message of an error raised while assembling.
fn source_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, (*message).to_owned())),
        _ => None,
    }
}

/// Renders `message` as a compiler-style diagnostic pointing at
/// `line:column` of `source`.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    column: usize,
    message: &str,
) -> String {
    let mut out = format!("error: {message}\n --> {file}:{line}:{column}\n");
    let Some(text) = source.lines().nth(line.saturating_sub(1)) else {
        return out;
    };
    let gutter = line.to_string().len().max(4);
    let _ = write!(
        out,
        "{:gutter$} |\n{line:>gutter$} | {}\n{:gutter$} | {:>column$}\n",
        "",
        text.trim_end_matches('\r'),
        "",
        "^",
    );
    out
}

/// Prints the diagnostic for `err` to stderr.
fn report(file: &str, source: &str, err: &VMError) {
    let text = match source_location(err) {
        Some((line, column, message)) => {
            render_assembly_diagnostic(file, source, line, column, &message)
        }
        None => format!("error: {err}\n"),
    };
    eprint!("{text}");
}

/// Label offsets collected by the first pass.
#[derive(Default)]
struct Labels(HashMap<String, u64>);

impl Labels {
    fn define(&mut self, name: &str, offset: u64) -> Result<(), VMError> {
        match self.0.entry(name.to_string()) {
            Entry::Occupied(_) => Err(VMError::DuplicateLabel {
                label: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(offset);
                Ok(())
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<u64, VMError> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }
}

/// A word of source text and the 1-based column it starts at.
#[derive(Debug, Clone, Copy, Default)]
struct Token<'a> {
    text: &'a str,
    offset: usize,
}

fn is_separator(c: char) -> bool {
    matches!(c, ',' | ' ' | '\t' | '\r' | COMMENT_CHAR)
}

/// Splits one source line into tokens.
///
/// Commas and whitespace separate tokens, `#` ends the line, and a
/// double-quoted string (with `\` escaping the next character) is one token.
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let end = match c {
            COMMENT_CHAR => break,
            c if is_separator(c) => {
                chars.next();
                continue;
            }
            '"' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            chars.next();
                        }
                        Some((i, '"')) => break i + 1,
                        Some(_) => {}
                        None => {
                            return Err(VMError::ParseError {
                                line: line_no,
                                offset: start + 1,
                                message: "unterminated string literal",
                            });
                        }
                    }
                }
            }
            _ => loop {
                match chars.peek() {
                    Some(&(i, c)) if is_separator(c) => break i,
                    Some(_) => {
                        chars.next();
                    }
                    None => break line.len(),
                }
            },
        };
        tokens.push(Token {
            text: &line[start..end],
            offset: start + 1,
        });
    }

    Ok(tokens)
}

/// `r<byte>` to a register index.
fn parse_reg(tok: &str) -> Result<u8, VMError> {
    tok.strip_prefix('r')
        .ok_or_else(|| VMError::ExpectedRegister(tok.to_string()))?
        .parse::<u8>()
        .map_err(|_| VMError::InvalidRegister {
            token: tok.to_string(),
        })
}

/// Parse a u64 immediate: decimal, `0x` hexadecimal, or a negative decimal
/// stored as its two's complement.
fn parse_u64(tok: &str) -> Result<u64, VMError> {
    let parsed = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u64::from_str_radix(&hex.replace('_', ""), 16).ok()
    } else if tok.starts_with('-') {
        tok.parse::<i64>().ok().map(|v| v as u64)
    } else {
        tok.replace('_', "").parse::<u64>().ok()
    };
    parsed.ok_or_else(|| VMError::InvalidImmediate {
        token: tok.to_string(),
        expected: "a 64-bit integer",
    })
}

/// Byte immediate in any [`parse_u64`] form except negative.
fn parse_u8(tok: &str) -> Result<u8, VMError> {
    parse_u64(tok)
        .ok()
        .filter(|v| !tok.starts_with('-') && *v <= u8::MAX as u64)
        .map(|v| v as u8)
        .ok_or_else(|| VMError::InvalidImmediate {
            token: tok.to_string(),
            expected: "a byte in 0..=255",
        })
}

/// Parses a u64 immediate or a `@label` reference.
///
/// A label resolves to its byte offset from the start of the image.
fn parse_u64_or_label(tok: &str, labels: &Labels) -> Result<u64, VMError> {
    match tok.strip_prefix(LABEL_PREFIX) {
        Some(name) => labels.resolve(name),
        None => parse_u64(tok),
    }
}

/// Parses an `OPERATE` selector: an operation mnemonic or a byte.
fn parse_operation(tok: &str) -> Result<u8, VMError> {
    match Operation::from_mnemonic(tok) {
        Some(op) => Ok(op as u8),
        None => parse_u8(tok),
    }
}

/// Parses a `SYSCALL` selector: a syscall mnemonic or a byte.
fn parse_syscall(tok: &str) -> Result<u8, VMError> {
    match Syscall::from_mnemonic(tok) {
        Some(call) => Ok(call as u8),
        None => parse_u8(tok),
    }
}

/// Decodes a double-quoted string literal into raw bytes.
fn parse_string_literal(tok: &str) -> Result<Vec<u8>, VMError> {
    let invalid = || VMError::InvalidImmediate {
        token: tok.to_string(),
        expected: "a string literal",
    };
    let body = tok
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(invalid)?;

    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.bytes();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escaped = match chars.next() {
            Some(b'n') => b'\n',
            Some(b't') => b'\t',
            Some(b'r') => b'\r',
            Some(b'0') => 0,
            Some(b'\\') => b'\\',
            Some(b'"') => b'"',
            _ => return Err(invalid()),
        };
        out.push(escaped);
    }
    Ok(out)
}

/// `name:` defines a label; a lone `:` or a quoted string does not.
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1 && !tok.starts_with('"')
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $method:ident, $mnemonic:literal, $stride:expr => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        fn instruction_from_str(name: &str) -> Result<Instruction, VMError> {
            match name {
                $( $mnemonic => Ok(Instruction::$name), )*
                _ => Err(VMError::InvalidInstructionName {
                    name: name.to_string(),
                }),
            }
        }

        /// Parse one instruction from tokens and append it to `out`.
        fn parse_instruction(
            labels: &Labels,
            tokens: &[Token],
            out: &mut ProgramBuilder,
        ) -> Result<(), VMError> {
            let Some(first) = tokens.first() else {
                return Err(VMError::ArityMismatch {
                    instruction: "<missing opcode>".to_string(),
                    expected: 1,
                    actual: 0,
                });
            };

            match instruction_from_str(first.text)? {
                $(
                    Instruction::$name => {
                        const EXPECTED: usize = define_parse_instruction!(@count $( $field ),*);
                        if tokens.len() != EXPECTED + 1 {
                            return Err(VMError::ArityMismatch {
                                instruction: first.text.to_string(),
                                expected: EXPECTED,
                                actual: tokens.len() - 1,
                            });
                        }

                        let mut it = tokens[1..].iter().map(|t| t.text);
                        $(
                            let $field = define_parse_instruction!(
                                @parse_operand $kind, it.next().unwrap_or_default(), labels
                            )?;
                        )*
                        out.$method($( $field ),*);
                        Ok(())
                    }
                ),*
            }
        }
    };

    // operand count
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( define_parse_instruction!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    // operand kinds
    (@parse_operand Reg, $tok:expr, $labels:expr) => {
        parse_reg($tok)
    };

    (@parse_operand Imm8, $tok:expr, $labels:expr) => {
        parse_u8($tok)
    };

    (@parse_operand OpSel, $tok:expr, $labels:expr) => {
        parse_operation($tok)
    };

    (@parse_operand SysSel, $tok:expr, $labels:expr) => {
        parse_syscall($tok)
    };

    (@parse_operand Imm64, $tok:expr, $labels:expr) => {
        parse_u64_or_label($tok, $labels)
    };
}

for_each_instruction!(define_parse_instruction);

/// A non-label line after the first pass.
enum Item<'a> {
    Instruction(Vec<Token<'a>>),
    Bytes(Vec<u8>),
    Zero(u64),
    Org(u64),
}

impl Item<'_> {
    /// Number of bytes the item adds when it starts at `offset`.
    fn size(&self, offset: u64) -> Result<u64, VMError> {
        match self {
            Item::Instruction(tokens) => Ok(instruction_from_str(tokens[0].text)?.stride()),
            Item::Bytes(bytes) => Ok(bytes.len() as u64),
            Item::Zero(count) => Ok(*count),
            Item::Org(target) if *target >= offset => Ok(target - offset),
            Item::Org(target) => Err(VMError::OriginBehind {
                target: *target,
                current: offset,
            }),
        }
    }
}

/// Parses a directive line into an [`Item`].
fn parse_directive<'a>(tokens: &[Token<'a>]) -> Result<Item<'a>, VMError> {
    let name = tokens[0].text;
    let args = &tokens[1..];
    let single = |args: &[Token]| -> Result<u64, VMError> {
        match args {
            [arg] => parse_u64(arg.text),
            _ => Err(VMError::ArityMismatch {
                instruction: name.to_string(),
                expected: 1,
                actual: args.len(),
            }),
        }
    };

    match name {
        ".bytes" => {
            let mut bytes = Vec::new();
            for arg in args {
                if arg.text.starts_with('"') {
                    bytes.extend(parse_string_literal(arg.text)?);
                } else {
                    bytes.push(parse_u8(arg.text)?);
                }
            }
            Ok(Item::Bytes(bytes))
        }
        ".zero" => Ok(Item::Zero(single(args)?)),
        ".org" => Ok(Item::Org(single(args)?)),
        _ => Err(VMError::InvalidDirective {
            name: name.to_string(),
        }),
    }
}

/// Wraps an error with the line and column it was found at.
fn at(line: usize, offset: usize) -> impl FnOnce(VMError) -> VMError {
    move |e| VMError::AssemblyError {
        line,
        offset,
        message: e.to_string(),
    }
}

/// Returns `offset + size`, refusing images larger than [`MAX_IMAGE_SIZE`].
fn grow(offset: u64, size: u64) -> Result<u64, VMError> {
    let end = offset as u128 + size as u128;
    if end > MAX_IMAGE_SIZE as u128 {
        return Err(VMError::ImageTooLarge {
            size: end,
            max: MAX_IMAGE_SIZE,
        });
    }
    Ok(end as u64)
}

/// Performs two-pass assembly.
///
/// Pass 1: Tokenizes all lines, parses directives, computes item sizes, and
/// records label offsets. Every instruction has a fixed stride, so offsets are
/// known before any operand is parsed.
///
/// Pass 2 emits bytecode, resolving `@label` operands.
fn assemble_lines(source: &str) -> Result<Vec<u8>, VMError> {
    let mut labels = Labels::default();
    let mut items: Vec<(usize, usize, Item)> = Vec::new();
    let mut offset = 0u64;

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let mut tokens = tokenize(line_no, line)?;

        while let Some(first) = tokens.first()
            && is_label_def(first.text)
        {
            labels
                .define(label_name(first.text), offset)
                .map_err(at(line_no, first.offset))?;
            tokens.remove(0);
        }

        let Some(first) = tokens.first() else {
            continue;
        };
        let column = first.offset;

        let item = if first.text.starts_with(DIRECTIVE_PREFIX) {
            parse_directive(&tokens).map_err(at(line_no, column))?
        } else {
            Item::Instruction(tokens)
        };
        offset = item
            .size(offset)
            .and_then(|size| grow(offset, size))
            .map_err(at(line_no, column))?;
        items.push((line_no, column, item));
    }

    let mut out = ProgramBuilder::new();
    for (line_no, column, item) in items {
        match item {
            Item::Instruction(tokens) => {
                parse_instruction(&labels, &tokens, &mut out).map_err(at(line_no, column))?;
            }
            Item::Bytes(bytes) => {
                out.data(&bytes);
            }
            Item::Zero(count) => {
                let target = out.offset() + count;
                out.zero_fill_to(target);
            }
            Item::Org(target) => {
                out.zero_fill_to(target);
            }
        }
    }

    Ok(out.finish())
}

/// Assemble a full source string into a program image.
///
/// Labels may be referenced before they are defined; every item is sized
/// before any operand is parsed.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, VMError> {
    assemble_source_with_name(source, "<source>")
}

/// Like [`assemble_source`], naming `source_name` in the diagnostic.
///
/// Logs a compiler-style diagnostic to stderr on failure, including source
/// location information.
pub fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Vec<u8>, VMError> {
    let result = assemble_lines(source);
    if let Err(err) = &result
        && cfg!(not(test))
    {
        report(source_name, source, err);
    }
    result
}

/// Reads and assembles the file at `path`.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, VMError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .map_err(|e| VMError::IoError(format!("{}: {e}", path.display())))?;
    assemble_source_with_name(&source, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembly_message(err: VMError) -> String {
        match err {
            VMError::AssemblyError { message, .. } => message,
            other => panic!("expected assembly error, got {other:?}"),
        }
    }

    #[test]
    fn registers_are_r_and_a_byte() {
        assert_eq!(parse_reg("r0").unwrap(), 0);
        assert_eq!(parse_reg("r42").unwrap(), 42);
        assert_eq!(parse_reg("r255").unwrap(), 255);
        assert!(matches!(parse_reg("7"), Err(VMError::ExpectedRegister(_))));
        assert!(matches!(parse_reg("x0"), Err(VMError::ExpectedRegister(_))));
        for tok in ["r", "r256", "r-1", "rAbc"] {
            assert!(
                matches!(parse_reg(tok), Err(VMError::InvalidRegister { .. })),
                "{tok}"
            );
        }
    }

    #[test]
    fn parse_u64_forms() {
        assert_eq!(parse_u64("42").unwrap(), 42);
        assert_eq!(parse_u64("0x1F").unwrap(), 31);
        assert_eq!(parse_u64("1_000").unwrap(), 1000);
        assert_eq!(parse_u64("-1").unwrap(), u64::MAX);
        assert_eq!(parse_u64("18446744073709551615").unwrap(), u64::MAX);
        assert!(parse_u64("0xg").is_err());
        assert!(parse_u64("ten").is_err());
    }

    #[test]
    fn parse_u8_range() {
        assert_eq!(parse_u8("255").unwrap(), 255);
        assert_eq!(parse_u8("0x7f").unwrap(), 127);
        assert!(matches!(
            parse_u8("256"),
            Err(VMError::InvalidImmediate { .. })
        ));
        assert!(parse_u8("-1").is_err());
    }

    #[test]
    fn selectors_accept_mnemonics_and_numbers() {
        assert_eq!(parse_operation("ADD").unwrap(), 6);
        assert_eq!(parse_operation("14").unwrap(), 14);
        assert_eq!(parse_syscall("WRITE").unwrap(), 1);
        assert_eq!(parse_syscall("0x05").unwrap(), 5);
        assert!(parse_operation("add").is_err()); // case-sensitive
    }

    #[test]
    fn string_literal_escapes() {
        assert_eq!(
            parse_string_literal(r#""Hi\n\t\"x\"\\\0""#).unwrap(),
            b"Hi\n\t\"x\"\\\0"
        );
        assert!(parse_string_literal(r#""bad\q""#).is_err());
        assert!(parse_string_literal("noquotes").is_err());
    }

    #[test]
    fn tokenize_strings_commas_and_comments() {
        let tokens = tokenize(1, r#"  .bytes "a, b # c", 10  # trailing"#).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec![".bytes", r#""a, b # c""#, "10"]);
        assert_eq!(tokens[0].offset, 3);
    }

    #[test]
    fn escaped_quote_stays_inside_string_token() {
        let tokens = tokenize(1, r#".bytes "say \"hi\"",0"#).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec![".bytes", r#""say \"hi\"""#, "0"]);
        assert_eq!(tokens[2].offset, 21);
    }

    #[test]
    fn tokenize_unterminated_string() {
        assert!(matches!(
            tokenize(4, r#".bytes "open"#),
            Err(VMError::ParseError { line: 4, offset: 8, .. })
        ));
    }

    #[test]
    fn blank_and_comment_lines_emit_nothing() {
        assert!(assemble_source("").unwrap().is_empty());
        assert!(assemble_source("# only a comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn write_register_encodes_little_endian() {
        let image = assemble_source("WRITE_REGISTER r200, 0x0102").unwrap();
        assert_eq!(image, vec![1, 0, 200, 2, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn assemble_matches_builder() {
        let source = "
            OPERATE r255, 127, ADD, r100, r200, r100   # mode 127: always, direct
            SYSCALL WRITE r202 r100 r203 r0 r0 r0 r101
            QUIT r255, r255
        ";
        let mut expected = ProgramBuilder::new();
        expected
            .operate(255, 127, Operation::Add as u8, 100, 200, 100)
            .syscall(Syscall::Write as u8, 202, 100, 203, 0, 0, 0, 101)
            .quit(255, 255);
        assert_eq!(assemble_source(source).unwrap(), expected.finish());
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let err = assemble_source("NOPE r1").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 1, .. }));
        assert_eq!(assembly_message(err), "unknown instruction 'NOPE'");
    }

    #[test]
    fn operand_count_must_match() {
        let err = assemble_source("QUIT r1").unwrap_err();
        assert_eq!(assembly_message(err), "QUIT expects 2 operands, got 1");
    }

    #[test]
    fn labels_resolve_to_image_offsets() {
        let source = "
            start: WRITE_REGISTER r13, @data
                   WRITE_REGISTER r14, @start
                   QUIT r13, r14
            data:  .bytes \"ok\"
        ";
        let image = assemble_source(source).unwrap();
        assert_eq!(image.len(), 11 + 11 + 4 + 2);
        assert_eq!(u64::from_le_bytes(image[3..11].try_into().unwrap()), 26);
        assert_eq!(u64::from_le_bytes(image[14..22].try_into().unwrap()), 0);
        assert_eq!(&image[26..], b"ok");
    }

    #[test]
    fn forward_references_across_directives() {
        let source = "
            WRITE_REGISTER r13, @message
            QUIT r13, r13
            .org 64
            message: .bytes \"Hello\", 0x0a
            end:
            WRITE_REGISTER r14, @end
        ";
        let image = assemble_source(source).unwrap();
        assert_eq!(u64::from_le_bytes(image[3..11].try_into().unwrap()), 64);
        assert_eq!(&image[64..70], b"Hello\n");
        assert_eq!(u64::from_le_bytes(image[73..81].try_into().unwrap()), 70);
    }

    #[test]
    fn zero_directive_pads() {
        let image = assemble_source(".bytes 1\n.zero 3\n.bytes 2").unwrap();
        assert_eq!(image, vec![1, 0, 0, 0, 2]);
    }

    #[test]
    fn org_behind_offset_fails() {
        let err = assemble_source("QUIT r0 r0\n.org 2").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, offset: 1, .. }));
    }

    #[test]
    fn oversized_images_are_rejected() {
        let err = assemble_source(".zero 0xFFFFFFFFFFFFFFFF\n.zero 1").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 1, offset: 1, .. }));
        assert!(assembly_message(err).starts_with("program image would reach"));

        let err = assemble_source("QUIT r0 r0\n  .org 0xFFFFFFFFFFFFFFFF").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, offset: 3, .. }));

        let source = format!(".zero {MAX_IMAGE_SIZE}\n.bytes 1");
        let err = assemble_source(&source).unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, .. }));
    }

    #[test]
    fn image_may_fill_the_size_cap() {
        let source = format!(".zero {}\nQUIT r0 r0", MAX_IMAGE_SIZE - 4);
        let image = assemble_source(&source).unwrap();
        assert_eq!(image.len() as u64, MAX_IMAGE_SIZE);
    }

    #[test]
    fn label_defined_twice_reports_line() {
        let err = assemble_source("a:\na:\nQUIT r0 r0").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 2, .. }));
        assert_eq!(assembly_message(err), "label 'a' is defined more than once");
    }

    #[test]
    fn missing_label_reports_line() {
        let err = assemble_source("WRITE_REGISTER r1, @missing").unwrap_err();
        assert_eq!(assembly_message(err), "undefined label 'missing'");
    }

    #[test]
    fn unknown_directive_error() {
        let err = assemble_source(".align 8").unwrap_err();
        assert_eq!(assembly_message(err), "unknown directive '.align'");
    }

    #[test]
    fn label_definitions_need_a_name() {
        assert!(is_label_def("loop:"));
        assert!(!is_label_def(":"));
        assert!(!is_label_def("loop"));
        assert!(!is_label_def("\"text:\""));
    }

    #[test]
    fn labels_reject_redefinition() {
        let mut labels = Labels::default();
        labels.define("start", 0).unwrap();
        labels.define("end", 9).unwrap();
        assert!(matches!(
            labels.define("start", 4),
            Err(VMError::DuplicateLabel { .. })
        ));
        assert_eq!(labels.resolve("end").unwrap(), 9);
        assert!(matches!(
            labels.resolve("middle"),
            Err(VMError::UndefinedLabel { .. })
        ));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("demo.asm", "QUIT r1\n  NOPE", 2, 3, "unknown");
        assert_eq!(
            diag,
            "error: unknown\n --> demo.asm:2:3\n     |\n   2 |   NOPE\n     |   ^\n"
        );
    }

    #[test]
    fn diagnostic_without_source_line_has_only_header() {
        let diag = render_assembly_diagnostic("demo.asm", "QUIT r1", 5, 1, "gone");
        assert_eq!(diag, "error: gone\n --> demo.asm:5:1\n");
    }
}
