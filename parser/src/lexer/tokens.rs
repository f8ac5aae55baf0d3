#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    Eof,
    Identifier(&'a str),
    Scalar(&'a str),
    Indent(usize),
    NewLine,

    Dash,
    Colon,
    Comma,
    Hash,

    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
}
