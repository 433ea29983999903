use std::sync::Arc;

use crate::catalog::{ResourceTypeDescriptor, TokenCatalog};
use crate::error::{SearchError, SearchResult};
use super::ast::{AstNode, Comparison};
use super::lexer::{self, Lexer, Token, RESOURCE_TYPE_TOKEN};

/// Parses query text into an AST and resolves the effective resource type.
///
/// Precedence, loosest first: `OR`, `AND` (explicit or by adjacency of two
/// primaries), `NOT`, parentheses. The reserved `resourcetype:Type` token
/// fixes the effective type and is pruned from the tree; a query that prunes
/// to nothing yields [`AstNode::AllResources`].
pub fn parse(
    text: &str,
    catalog: &TokenCatalog,
) -> SearchResult<(AstNode, Arc<ResourceTypeDescriptor>)> {
    lexer::validate_balance(text)?;
    let tokens = Lexer::new(text).tokenize()?;
    let tokens = sanitize(tokens);
    let effective = effective_type(&tokens, catalog)?;

    if tokens.is_empty() {
        return Ok((AstNode::AllResources, effective));
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        catalog,
    };
    let parsed = parser.parse_or(&effective)?;
    if let Some(token) = parser.current_token() {
        return Err(SearchError::syntax(
            format!("{token:?}"),
            "unexpected trailing token",
        ));
    }

    let ast = match parsed {
        Parsed::Node(node) => node,
        Parsed::TypeTag => AstNode::AllResources,
    };
    tracing::debug!(effective_type = %effective.name, "parsed query");
    Ok((ast, effective))
}

/// Token-stream cleanup applied before tree building: purely decorative
/// empty parenthesis groups and dangling boundary operators are stripped
/// rather than rejected. The simplified (property, value)-pair API
/// concatenates tokens without careful spacing, so this leniency is a
/// deliberate, logged policy.
pub(crate) fn sanitize(mut tokens: Vec<Token>) -> Vec<Token> {
    loop {
        let mut changed = false;

        let mut i = 0;
        while i + 1 < tokens.len() {
            if tokens[i] == Token::LParen && tokens[i + 1] == Token::RParen {
                tracing::warn!("stripping empty parenthesis group from query");
                tokens.drain(i..=i + 1);
                changed = true;
            } else {
                i += 1;
            }
        }

        while matches!(tokens.first(), Some(Token::And | Token::Or)) {
            tracing::warn!(token = ?tokens[0], "stripping dangling leading operator");
            tokens.remove(0);
            changed = true;
        }

        while matches!(tokens.last(), Some(Token::And | Token::Or | Token::Not)) {
            tracing::warn!(token = ?tokens[tokens.len() - 1], "stripping dangling trailing operator");
            tokens.pop();
            changed = true;
        }

        if !changed {
            return tokens;
        }
    }
}

/// Pre-scans the token stream for `resourcetype:Type` and resolves the
/// effective resource type. The first occurrence wins; a later occurrence
/// naming a different type is an error. Without the token the catalog's
/// default type applies.
fn effective_type(
    tokens: &[Token],
    catalog: &TokenCatalog,
) -> SearchResult<Arc<ResourceTypeDescriptor>> {
    let mut found: Option<Arc<ResourceTypeDescriptor>> = None;

    for i in 0..tokens.len() {
        let Token::Term(name) = &tokens[i] else {
            continue;
        };
        if !name.eq_ignore_ascii_case(RESOURCE_TYPE_TOKEN) {
            continue;
        }
        if tokens.get(i + 1) != Some(&Token::Colon) {
            continue;
        }
        let type_name = match tokens.get(i + 2) {
            Some(Token::Term(v)) | Some(Token::Quoted(v)) => v,
            _ => continue,
        };

        let descriptor = catalog.resource_type(type_name).ok_or_else(|| {
            SearchError::syntax(type_name.clone(), "unknown resource type")
        })?;
        match &found {
            None => found = Some(descriptor),
            Some(previous) if previous.name.eq_ignore_ascii_case(&descriptor.name) => {}
            Some(previous) => {
                return Err(SearchError::syntax(
                    type_name.clone(),
                    format!(
                        "conflicting resource types '{}' and '{}'",
                        previous.name, descriptor.name
                    ),
                ));
            }
        }
    }

    Ok(found.unwrap_or_else(|| catalog.default_type()))
}

/// Intermediate parse result: either a real tree node, or the pruned
/// `resourcetype` metadata tag, which dissolves during combination.
enum Parsed {
    Node(AstNode),
    TypeTag,
}

fn combine(
    left: Parsed,
    right: Parsed,
    op: fn(Box<AstNode>, Box<AstNode>) -> AstNode,
) -> Parsed {
    match (left, right) {
        (Parsed::Node(l), Parsed::Node(r)) => Parsed::Node(op(Box::new(l), Box::new(r))),
        (Parsed::Node(l), Parsed::TypeTag) => Parsed::Node(l),
        (Parsed::TypeTag, Parsed::Node(r)) => Parsed::Node(r),
        (Parsed::TypeTag, Parsed::TypeTag) => Parsed::TypeTag,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    catalog: &'a TokenCatalog,
}

impl<'a> Parser<'a> {
    fn current_token(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> SearchResult<()> {
        if self.current_token() == Some(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(SearchError::syntax(
                format!("{:?}", self.current_token()),
                format!("expected {expected:?}"),
            ))
        }
    }

    fn starts_primary(token: &Token) -> bool {
        matches!(
            token,
            Token::LParen | Token::Not | Token::Term(_) | Token::Quoted(_)
        )
    }

    fn parse_or(&mut self, scope: &Arc<ResourceTypeDescriptor>) -> SearchResult<Parsed> {
        let mut left = self.parse_and(scope)?;

        while self.current_token() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and(scope)?;
            left = combine(left, right, AstNode::Or);
        }

        Ok(left)
    }

    fn parse_and(&mut self, scope: &Arc<ResourceTypeDescriptor>) -> SearchResult<Parsed> {
        let mut left = self.parse_unary(scope)?;

        loop {
            match self.current_token() {
                Some(Token::And) => {
                    self.advance();
                }
                // Adjacency of two primaries is an implicit AND; this is
                // how the pair-list form renders.
                Some(token) if Self::starts_primary(token) => {}
                _ => break,
            }
            let right = self.parse_unary(scope)?;
            left = combine(left, right, AstNode::And);
        }

        Ok(left)
    }

    fn parse_unary(&mut self, scope: &Arc<ResourceTypeDescriptor>) -> SearchResult<Parsed> {
        if self.current_token() == Some(&Token::Not) {
            self.advance();
            return Ok(match self.parse_unary(scope)? {
                Parsed::Node(node) => Parsed::Node(AstNode::Not(Box::new(node))),
                Parsed::TypeTag => Parsed::TypeTag,
            });
        }
        self.parse_primary(scope)
    }

    fn parse_primary(&mut self, scope: &Arc<ResourceTypeDescriptor>) -> SearchResult<Parsed> {
        match self.current_token().cloned() {
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_or(scope)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }

            Some(Token::Term(name)) => {
                self.advance();
                match self.current_token().cloned() {
                    Some(Token::Colon) => {
                        self.advance();
                        let value = self.expect_value()?;
                        let starts_with = self.consume_star();
                        if name.eq_ignore_ascii_case(RESOURCE_TYPE_TOKEN) {
                            // Validated by the pre-scan; metadata, not a filter.
                            return Ok(Parsed::TypeTag);
                        }
                        let operator = if starts_with {
                            Comparison::WordStartsWith
                        } else {
                            Comparison::WordEqual
                        };
                        self.property_predicate(scope, &name, operator, value)
                    }

                    Some(ref token) if comparison_of(token).is_some() => {
                        let operator = comparison_of(token).expect("guard checked operator");
                        self.advance();
                        let value = self.expect_value()?;
                        if self.consume_star() {
                            return Err(SearchError::syntax(
                                value,
                                "wildcard suffix is only valid with ':'",
                            ));
                        }
                        self.property_predicate(scope, &name, operator, value)
                    }

                    Some(Token::Dot) => {
                        self.advance();
                        self.traversal(scope, &name)
                    }

                    _ => {
                        let starts_with = self.consume_star();
                        self.implicit_predicate(scope, name, starts_with)
                    }
                }
            }

            Some(Token::Quoted(value)) => {
                self.advance();
                let starts_with = self.consume_star();
                self.implicit_predicate(scope, value, starts_with)
            }

            other => Err(SearchError::syntax(
                format!("{other:?}"),
                "expected a term, quoted literal, NOT, or '('",
            )),
        }
    }

    fn consume_star(&mut self) -> bool {
        if self.current_token() == Some(&Token::Star) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_value(&mut self) -> SearchResult<String> {
        match self.current_token().cloned() {
            Some(Token::Term(v)) | Some(Token::Quoted(v)) => {
                self.advance();
                Ok(v)
            }
            other => Err(SearchError::syntax(
                format!("{other:?}"),
                "expected a value",
            )),
        }
    }

    fn property_predicate(
        &self,
        scope: &Arc<ResourceTypeDescriptor>,
        name: &str,
        operator: Comparison,
        value: String,
    ) -> SearchResult<Parsed> {
        let property = self.catalog.property(scope, name).ok_or_else(|| {
            SearchError::syntax(
                name.to_string(),
                format!("unknown property for resource type '{}'", scope.name),
            )
        })?;
        Ok(Parsed::Node(AstNode::Predicate {
            property,
            operator,
            value,
        }))
    }

    /// A bare term names no property: it searches the implicit properties
    /// configured in the catalog, as a disjunction.
    fn implicit_predicate(
        &self,
        scope: &Arc<ResourceTypeDescriptor>,
        value: String,
        starts_with: bool,
    ) -> SearchResult<Parsed> {
        let properties = self.catalog.implicit_properties(scope);
        if properties.is_empty() {
            return Err(SearchError::syntax(
                value,
                format!(
                    "no property named and no implicit properties configured for resource type '{}'",
                    scope.name
                ),
            ));
        }

        let operator = if starts_with {
            Comparison::WordStartsWith
        } else {
            Comparison::WordEqual
        };
        let mut tree: Option<AstNode> = None;
        for property in properties {
            let leaf = AstNode::Predicate {
                property,
                operator,
                value: value.clone(),
            };
            tree = Some(match tree {
                None => leaf,
                Some(left) => AstNode::Or(Box::new(left), Box::new(leaf)),
            });
        }
        Ok(Parsed::Node(tree.expect("at least one implicit property")))
    }

    /// Dot qualification: the nested subtree matches resources reached
    /// through the named predicate, so its names resolve against the
    /// predicate's far-end type.
    fn traversal(
        &mut self,
        scope: &Arc<ResourceTypeDescriptor>,
        name: &str,
    ) -> SearchResult<Parsed> {
        let predicate = self.catalog.predicate(name).ok_or_else(|| {
            SearchError::syntax(name.to_string(), "unknown property or predicate")
        })?;
        if !self.catalog.is_descendant(&scope.name, predicate.anchor_type()) {
            return Err(SearchError::syntax(
                name.to_string(),
                format!(
                    "predicate does not apply to resource type '{}'",
                    scope.name
                ),
            ));
        }
        let target = self
            .catalog
            .resource_type(predicate.target_type())
            .ok_or_else(|| {
                SearchError::Configuration(format!(
                    "predicate '{}' targets unregistered type '{}'",
                    predicate.name,
                    predicate.target_type()
                ))
            })?;

        let nested = match self.parse_primary(&target)? {
            Parsed::Node(node) => node,
            Parsed::TypeTag => AstNode::AllResources,
        };
        Ok(Parsed::Node(AstNode::Traversal {
            predicate,
            nested: Box::new(nested),
        }))
    }
}

fn comparison_of(token: &Token) -> Option<Comparison> {
    match token {
        Token::Equal => Some(Comparison::Equal),
        Token::NotEqual => Some(Comparison::NotEqual),
        Token::LessThan => Some(Comparison::LessThan),
        Token::LessThanEq => Some(Comparison::LessThanOrEqual),
        Token::GreaterThan => Some(Comparison::GreaterThan),
        Token::GreaterThanEq => Some(Comparison::GreaterThanOrEqual),
        _ => None,
    }
}
