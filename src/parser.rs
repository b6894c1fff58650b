use std::collections::HashSet;

use thiserror::Error;

use crate::{
    ast::{
        Argument, Attribute, Definition, EnumDef, ExtArgument, ExtAttribute, IdlModule,
        InterfaceDef, Operation, Type,
    },
    color,
    lexer::{Lexer, Position, Token, TokenKind},
};

/// A positioned syntax error.
#[derive(Debug, Error)]
#[error("{red}error{end}: {message} at position {position}\n{context}", red = color::RED, end = color::END)]
pub struct ParseError {
    pub position: Position,
    pub message: String,
    /// Source excerpt with the offending token underlined.
    pub context: String,
}

/// The `Parser` struct is responsible for parsing IDL source code into an `IdlModule`.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
    module: IdlModule,
}

impl<'a> Parser<'a> {
    /// Creates a new parser and grabs the first token.
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current_token = lexer.next().ok_or_else(|| ParseError {
            position: Position::default(),
            message: "empty source file".to_string(),
            context: String::new(),
        })?;

        Ok(Parser {
            lexer,
            current_token,
            module: IdlModule::default(),
        })
    }

    /// Advances the parser to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next().unwrap_or(Token {
            kind: TokenKind::Eof,
            position: self.current_token.position,
            code: String::new(),
        });
    }

    /// Builds an error pointing at the current token.
    fn error(&self, message: String) -> ParseError {
        ParseError {
            position: self.current_token.position,
            context: self.lexer.display_in_context(&self.current_token.position),
            message,
        }
    }

    /// Checks if the current token matches an expected kind, consumes it, and advances.
    fn consume(&mut self, expected: TokenKind) -> Result<(), ParseError> {
        if self.current_token.kind == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {:?}, found {:?}",
                expected, self.current_token.kind
            )))
        }
    }

    /// Consumes the current token if it matches, reporting whether it did.
    fn eat(&mut self, expected: TokenKind) -> bool {
        if self.current_token.kind == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    // --- Core Parsing Functions ---

    /// Parses the entire IDL module.
    ///
    /// Definitions keep their source order; the declaration order used by
    /// generators is computed separately by [`crate::order`].
    pub fn parse_module(mut self) -> Result<IdlModule, ParseError> {
        let mut seen = HashSet::new();

        while self.current_token.kind != TokenKind::Eof {
            let position = self.current_token.position;
            let def = self.parse_definition()?;
            if !seen.insert(def.name().to_string()) {
                return Err(ParseError {
                    position,
                    context: self.lexer.display_in_context(&position),
                    message: format!("{} already exists, found second definition", def.name()),
                });
            }
            self.module.definitions.push(def);
        }

        Ok(self.module)
    }

    /// Parses a top-level definition: interface or enum.
    fn parse_definition(&mut self) -> Result<Definition, ParseError> {
        let ext_attrs = self.parse_ext_attrs()?;
        let position = self.current_token.position;
        match self.current_token.kind {
            TokenKind::Interface => self.parse_interface(ext_attrs, position),
            TokenKind::Enum => self.parse_enum(ext_attrs, position),
            _ => Err(self.error(format!(
                "expected 'interface' or 'enum', found {:?}",
                self.current_token.kind
            ))),
        }
    }

    // --- Extension attributes ---

    /// Parses an optional `[name, name=value, name(a, b)]` list.
    fn parse_ext_attrs(&mut self) -> Result<Vec<ExtAttribute>, ParseError> {
        let mut attrs = Vec::new();
        if !self.eat(TokenKind::OpenBracket) {
            return Ok(attrs);
        }

        loop {
            let position = self.current_token.position;
            let name = self.consume_identifier()?;
            let mut args = Vec::new();

            if self.eat(TokenKind::Assign) {
                args.push(self.parse_ext_argument()?);
            } else if self.eat(TokenKind::OpenParen) {
                if self.current_token.kind != TokenKind::CloseParen {
                    args.push(self.parse_ext_argument()?);
                    while self.eat(TokenKind::Comma) {
                        args.push(self.parse_ext_argument()?);
                    }
                }
                self.consume(TokenKind::CloseParen)?;
            }

            attrs.push(ExtAttribute {
                name,
                position,
                args,
            });

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::CloseBracket)?;
        Ok(attrs)
    }

    fn parse_ext_argument(&mut self) -> Result<ExtArgument, ParseError> {
        let string = match &self.current_token.kind {
            TokenKind::LiteralString(value) => Some(value.clone()),
            TokenKind::Identifier(_) | TokenKind::LiteralInt(_) => None,
            _ => {
                return Err(self.error(format!(
                    "expected an extension attribute value, found {:?}",
                    self.current_token.kind
                )));
            }
        };
        let arg = ExtArgument {
            code: self.current_token.code.clone(),
            string,
            position: self.current_token.position,
        };
        self.advance();
        Ok(arg)
    }

    // --- Type Parsing ---

    /// Parses a type with any number of trailing `?` markers.
    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut type_info = match self.current_token.kind {
            TokenKind::Sequence => Type::sequence(self.parse_wrapped()?),
            TokenKind::Translatable => Type::translatable(self.parse_wrapped()?),
            TokenKind::Identifier(_) => Type::Simple(self.parse_simple_name()?),
            _ => {
                return Err(self.error(format!(
                    "expected a type name, found {:?}",
                    self.current_token.kind
                )));
            }
        };
        while self.eat(TokenKind::Question) {
            type_info = Type::optional(type_info);
        }
        Ok(type_info)
    }

    /// Parses the `<T>` part of `sequence<T>` or `translatable<T>`.
    fn parse_wrapped(&mut self) -> Result<Type, ParseError> {
        self.advance();
        self.consume(TokenKind::Less)?;
        let sub = self.parse_type()?;
        self.consume(TokenKind::Greater)?;
        Ok(sub)
    }

    /// Parses a simple type name, folding `long long` into one name.
    fn parse_simple_name(&mut self) -> Result<String, ParseError> {
        let name = self.consume_identifier()?;
        if name == "long" && self.current_token.kind == TokenKind::Identifier("long".to_string()) {
            self.advance();
            return Ok("long long".to_string());
        }
        Ok(name)
    }

    /// Helper to consume an Identifier and return its string value.
    fn consume_identifier(&mut self) -> Result<String, ParseError> {
        let name = match &self.current_token.kind {
            TokenKind::Identifier(id) => id.clone(),
            _ => {
                return Err(self.error(format!(
                    "expected an identifier, found {:?}",
                    self.current_token.kind
                )));
            }
        };
        self.advance();
        Ok(name)
    }

    // --- Interface Parsing ---

    fn parse_interface(
        &mut self,
        ext_attrs: Vec<ExtAttribute>,
        position: Position,
    ) -> Result<Definition, ParseError> {
        self.consume(TokenKind::Interface)?;
        let name = self.consume_identifier()?;
        let inheritance = if self.eat(TokenKind::Colon) {
            Some(self.consume_identifier()?)
        } else {
            None
        };

        self.consume(TokenKind::OpenBrace)?;
        let mut attributes = Vec::new();
        let mut operations = Vec::new();
        while self.current_token.kind != TokenKind::CloseBrace
            && self.current_token.kind != TokenKind::Eof
        {
            let member_attrs = self.parse_ext_attrs()?;
            let member_position = self.current_token.position;
            if self.eat(TokenKind::Attribute) {
                let type_info = self.parse_type()?;
                let name = self.consume_identifier()?;
                self.consume(TokenKind::Semicolon)?;
                attributes.push(Attribute {
                    name,
                    type_info,
                    ext_attrs: member_attrs,
                    position: member_position,
                });
            } else {
                operations.push(self.parse_operation(member_attrs, member_position)?);
            }
        }
        self.consume(TokenKind::CloseBrace)?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Definition::Interface(InterfaceDef {
            name,
            inheritance,
            attributes,
            operations,
            ext_attrs,
            position,
        }))
    }

    /// Parses `type name(args);`.
    fn parse_operation(
        &mut self,
        ext_attrs: Vec<ExtAttribute>,
        position: Position,
    ) -> Result<Operation, ParseError> {
        let return_type = self.parse_type()?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::OpenParen)?;

        let mut args = Vec::new();
        if self.current_token.kind != TokenKind::CloseParen {
            args.push(self.parse_argument()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.parse_argument()?);
            }
        }
        self.consume(TokenKind::CloseParen)?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Operation {
            name,
            return_type,
            args,
            ext_attrs,
            position,
        })
    }

    fn parse_argument(&mut self) -> Result<Argument, ParseError> {
        let ext_attrs = self.parse_ext_attrs()?;
        let position = self.current_token.position;
        let type_info = self.parse_type()?;
        let name = self.consume_identifier()?;
        Ok(Argument {
            name,
            type_info,
            ext_attrs,
            position,
        })
    }

    // --- Enum Parsing ---

    /// Parses an enum definition. Items may be identifiers or string literals.
    fn parse_enum(
        &mut self,
        ext_attrs: Vec<ExtAttribute>,
        position: Position,
    ) -> Result<Definition, ParseError> {
        self.consume(TokenKind::Enum)?;
        let name = self.consume_identifier()?;
        self.consume(TokenKind::OpenBrace)?;

        let mut items: Vec<String> = Vec::new();
        while self.current_token.kind != TokenKind::CloseBrace
            && self.current_token.kind != TokenKind::Eof
        {
            let item = match &self.current_token.kind {
                TokenKind::Identifier(id) | TokenKind::LiteralString(id) => id.clone(),
                _ => {
                    return Err(self.error(format!(
                        "expected an enum item, found {:?}",
                        self.current_token.kind
                    )));
                }
            };
            if items.contains(&item) {
                return Err(self.error(format!("duplicate enum item '{item}' in {name}")));
            }
            self.advance();
            items.push(item);

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::CloseBrace)?;
        self.consume(TokenKind::Semicolon)?;

        if items.is_empty() {
            return Err(ParseError {
                position,
                context: self.lexer.display_in_context(&position),
                message: format!("enum {name} has no items"),
            });
        }

        Ok(Definition::Enum(EnumDef {
            name,
            items,
            ext_attrs,
            position,
        }))
    }
}

/// Parses a complete source text.
pub fn parse(source: &str) -> Result<IdlModule, ParseError> {
    Parser::new(source)?.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enum() {
        let module = parse(r#"enum Color { "RED", GREEN, BLUE, };"#).unwrap();

        if let Definition::Enum(e) = &module.definitions[0] {
            assert_eq!(e.name, "Color");
            assert_eq!(e.items, vec!["RED", "GREEN", "BLUE"]);
        } else {
            panic!("Expected Enum definition");
        }
    }

    #[test]
    fn test_parse_interface() {
        let source = "
        [merge=none, spaceship]
        interface Pin : Base {
            [or_value, guard=\"HAS_PIN\"] attribute sequence<string>? names;
            attribute translatable<long long> counts;
            [static] void reset([in] string why, [out] int code);
        };
        ";
        let module = parse(source).unwrap();

        let Definition::Interface(i) = &module.definitions[0] else {
            panic!("Expected Interface definition");
        };
        assert_eq!(i.name, "Pin");
        assert_eq!(i.inheritance.as_deref(), Some("Base"));
        assert_eq!(i.ext_attrs.len(), 2);
        assert_eq!(i.ext_attrs[0].name, "merge");
        assert_eq!(i.ext_attrs[0].args[0].code, "none");
        assert_eq!(i.ext_attrs[1].args.len(), 0);

        assert_eq!(i.attributes.len(), 2);
        assert_eq!(
            i.attributes[0].type_info,
            Type::optional(Type::sequence(Type::simple("string")))
        );
        let guard = &i.attributes[0].ext_attrs[1];
        assert_eq!(guard.args[0].string.as_deref(), Some("HAS_PIN"));
        assert_eq!(guard.args[0].code, "\"HAS_PIN\"");
        assert_eq!(
            i.attributes[1].type_info,
            Type::translatable(Type::simple("long long"))
        );

        let op = &i.operations[0];
        assert_eq!(op.name, "reset");
        assert_eq!(op.return_type, Type::simple("void"));
        assert_eq!(op.args.len(), 2);
        assert_eq!(op.args[1].ext_attrs[0].name, "out");
    }

    #[test]
    fn test_parse_ext_attr_list_arguments() {
        let module = parse("interface A { [guards(X, \"Y\")] void f(); [guards()] void g(); };").unwrap();
        let Definition::Interface(i) = &module.definitions[0] else {
            panic!("Expected Interface definition");
        };
        let texts: Vec<&str> = i.operations[0].ext_attrs[0].args.iter().map(|a| a.text()).collect();
        assert_eq!(texts, vec!["X", "Y"]);
        assert!(i.operations[1].ext_attrs[0].args.is_empty());
    }

    #[test]
    fn test_duplicate_definition() {
        let err = parse("enum A { X }; interface A { };").unwrap_err();
        assert!(err.message.contains("already exists"));
        assert_eq!(err.position.line, 0);
    }

    #[test]
    fn test_duplicate_enum_item() {
        let err = parse("enum A { X, X };").unwrap_err();
        assert!(err.message.contains("duplicate enum item"));
    }

    #[test]
    fn test_syntax_error_is_positioned() {
        let err = parse("interface A {\n  attribute int;\n};").unwrap_err();
        assert_eq!(err.position.line, 1);
        assert!(err.to_string().contains("at position 2:"));
    }

    #[test]
    fn test_missing_semicolon() {
        assert!(parse("interface A { }").is_err());
    }
}
