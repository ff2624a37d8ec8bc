use crate::error::{Error, Result};
use crate::frontend::token::{Token, TokenKind};
use crate::ir::OpKind;

pub struct Tokenizer;

impl Tokenizer {
    pub fn tokenize(input: &str) -> Result<Vec<Token>> {
        let chars: Vec<char> = input.chars().collect();
        let mut position = 0;
        let mut line = 1;
        let mut tokens = Vec::new();

        while position < chars.len() {
            position = Self::next_token(&chars, position, &mut line, &mut tokens)?;
        }

        Ok(tokens)
    }

    // Try to extract the next token from the input starting at position
    fn next_token(
        chars: &[char],
        mut position: usize,
        line: &mut usize,
        tokens: &mut Vec<Token>,
    ) -> Result<usize> {
        // Skip whitespace other than newlines
        while position < chars.len() && chars[position] != '\n' && chars[position].is_whitespace()
        {
            position += 1;
        }

        let Some(&next_char) = chars.get(position) else {
            return Ok(position);
        };
        let peek = chars.get(position + 1).copied();

        match next_char {
            '\n' => {
                tokens.push(Token::new(TokenKind::Newline, *line));
                *line += 1;
                return Ok(position + 1);
            }
            '/' if peek == Some('/') => {
                while position < chars.len() && chars[position] != '\n' {
                    position += 1;
                }
                return Ok(position);
            }
            '%' | ':' | '@' => {
                let end = Self::scan_name(chars, position + 1);
                if end == position + 1 {
                    return Err(Error::parse(
                        *line,
                        format!("expected a name after '{}'", next_char),
                    ));
                }
                let name: String = chars[position..end].iter().collect();
                let kind = match next_char {
                    '%' => TokenKind::Var(name),
                    ':' => TokenKind::Label(name),
                    _ => TokenKind::Function(name),
                };
                tokens.push(Token::new(kind, *line));
                return Ok(end);
            }
            _ => {}
        }

        // Handle numbers, including a leading minus where an operand is expected
        let negative = next_char == '-'
            && peek.is_some_and(|c| c.is_ascii_digit())
            && !Self::follows_operand(tokens);
        if next_char.is_ascii_digit() || negative {
            let mut end_pos = position + 1;
            while end_pos < chars.len() && chars[end_pos].is_ascii_digit() {
                end_pos += 1;
            }
            let num_str: String = chars[position..end_pos].iter().collect();
            let num = num_str
                .parse::<i64>()
                .map_err(|e| Error::parse(*line, format!("invalid number '{}': {}", num_str, e)))?;
            tokens.push(Token::new(TokenKind::Number(num), *line));
            return Ok(end_pos);
        }

        if next_char.is_alphabetic() || next_char == '_' {
            let end = Self::scan_word(chars, position);
            let word: String = chars[position..end].iter().collect();
            tokens.push(Token::new(TokenKind::Word(word), *line));
            return Ok(end);
        }

        // Handle operators and other symbols, longest match first
        let (kind, width) = match (next_char, peek) {
            ('<', Some('-')) => (TokenKind::Arrow, 2),
            ('<', Some('<')) => (TokenKind::Op(OpKind::Shl), 2),
            ('<', Some('=')) => (TokenKind::Op(OpKind::Lte), 2),
            ('>', Some('>')) => (TokenKind::Op(OpKind::Shr), 2),
            ('>', Some('=')) => (TokenKind::Op(OpKind::Gte), 2),
            ('<', _) => (TokenKind::Op(OpKind::Lt), 1),
            ('>', _) => (TokenKind::Op(OpKind::Gt), 1),
            ('=', _) => (TokenKind::Op(OpKind::Eq), 1),
            ('+', _) => (TokenKind::Op(OpKind::Add), 1),
            ('-', _) => (TokenKind::Op(OpKind::Sub), 1),
            ('*', _) => (TokenKind::Op(OpKind::Mul), 1),
            ('&', _) => (TokenKind::Op(OpKind::BitAnd), 1),
            ('(', _) => (TokenKind::LeftParen, 1),
            (')', _) => (TokenKind::RightParen, 1),
            ('[', _) => (TokenKind::LeftBracket, 1),
            (']', _) => (TokenKind::RightBracket, 1),
            ('{', _) => (TokenKind::LeftBrace, 1),
            ('}', _) => (TokenKind::RightBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            _ => {
                return Err(Error::parse(
                    *line,
                    format!("invalid character '{}'", next_char),
                ));
            }
        };
        tokens.push(Token::new(kind, *line));
        Ok(position + width)
    }

    fn scan_name(chars: &[char], mut position: usize) -> usize {
        while position < chars.len() && (chars[position].is_alphanumeric() || chars[position] == '_')
        {
            position += 1;
        }
        position
    }

    // Words may contain inner hyphens, as in `tensor-error`
    fn scan_word(chars: &[char], mut position: usize) -> usize {
        while position < chars.len() {
            let c = chars[position];
            let inner_hyphen =
                c == '-' && chars.get(position + 1).is_some_and(|next| next.is_alphabetic());
            if c.is_alphanumeric() || c == '_' || inner_hyphen {
                position += 1;
            } else {
                break;
            }
        }
        position
    }

    fn follows_operand(tokens: &[Token]) -> bool {
        matches!(
            tokens.last().map(|token| &token.kind),
            Some(TokenKind::Var(_))
                | Some(TokenKind::Number(_))
                | Some(TokenKind::RightBracket)
                | Some(TokenKind::RightParen)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Tokenizer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_assignment() {
        assert_eq!(
            kinds("%x <- %y << 2"),
            vec![
                TokenKind::Var("%x".to_string()),
                TokenKind::Arrow,
                TokenKind::Var("%y".to_string()),
                TokenKind::Op(OpKind::Shl),
                TokenKind::Number(2),
            ]
        );
    }

    #[test]
    fn test_tokenize_negative_numbers() {
        assert_eq!(
            kinds("%x <- -5"),
            vec![
                TokenKind::Var("%x".to_string()),
                TokenKind::Arrow,
                TokenKind::Number(-5),
            ]
        );
        assert_eq!(
            kinds("%x - 5"),
            vec![
                TokenKind::Var("%x".to_string()),
                TokenKind::Op(OpKind::Sub),
                TokenKind::Number(5),
            ]
        );
    }

    #[test]
    fn test_tokenize_comments_and_lines() {
        let tokens = Tokenizer::tokenize("// header\n:entry // the entry\nreturn").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Newline);
        assert_eq!(tokens[1].kind, TokenKind::Label(":entry".to_string()));
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[3].kind, TokenKind::Word("return".to_string()));
        assert_eq!(tokens[3].line, 3);
    }

    #[test]
    fn test_tokenize_hyphenated_word() {
        assert_eq!(
            kinds("call tensor-error(1)"),
            vec![
                TokenKind::Word("call".to_string()),
                TokenKind::Word("tensor-error".to_string()),
                TokenKind::LeftParen,
                TokenKind::Number(1),
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_invalid_character() {
        let err = Tokenizer::tokenize("%x <- $").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }
}
