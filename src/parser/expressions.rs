//! Expression parsing using Pratt precedence.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::span::Span;

use super::core::{ParseResult, Parser};
use super::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Equals)
    }

    pub(crate) fn parse_precedence(&mut self, min_precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.is_at_end() {
            let precedence = get_precedence(&self.peek().kind);
            if precedence == Precedence::None || precedence < min_precedence {
                break;
            }

            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParserError::no_prefix_parse(
                format!("{}", TokenKind::Eof),
                self.current_span(),
            ));
        }

        let token = self.advance();
        let start_span = token.span;

        match &token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::new(ExprKind::IntLiteral(*n), start_span)),
            TokenKind::StringLiteral(s) => {
                Ok(Expr::new(ExprKind::StringLiteral(s.clone()), start_span))
            }
            TokenKind::BoolLiteral(b) => Ok(Expr::new(ExprKind::BoolLiteral(*b), start_span)),

            TokenKind::Identifier(name) => {
                Ok(Expr::new(ExprKind::Variable(name.clone()), start_span))
            }

            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::LeftBracket => {
                let elements = self.parse_expression_list(&TokenKind::RightBracket)?;
                let span = start_span.merge(&self.previous_span());
                Ok(Expr::new(ExprKind::Array(elements), span))
            }
            TokenKind::LeftBrace => self.parse_hash(start_span),

            TokenKind::Minus => self.parse_unary(UnaryOp::Negate, start_span),
            TokenKind::Bang => self.parse_unary(UnaryOp::Not, start_span),

            TokenKind::If => self.parse_if(start_span),
            TokenKind::Fn => self.parse_function(start_span),

            _ => Err(ParserError::no_prefix_parse(
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> ParseResult<Expr> {
        let token = self.advance();

        let operator = match token.kind {
            TokenKind::LeftParen => {
                let arguments = self.parse_expression_list(&TokenKind::RightParen)?;
                let span = left.span.merge(&self.previous_span());
                return Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(left),
                        arguments,
                    },
                    span,
                ));
            }
            TokenKind::LeftBracket => {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = left.span.merge(&self.previous_span());
                return Ok(Expr::new(
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ));
            }
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::BangEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::Greater => BinaryOp::Greater,
            other => {
                return Err(ParserError::unexpected_token(
                    "operator",
                    format!("{}", other),
                    token.span,
                ))
            }
        };

        self.binary_expr(left, operator, precedence)
    }

    fn binary_expr(
        &mut self,
        left: Expr,
        operator: BinaryOp,
        precedence: Precedence,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(precedence.next())?;
        let span = left.span.merge(&right.span);
        Ok(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_unary(&mut self, operator: UnaryOp, start_span: Span) -> ParseResult<Expr> {
        let operand = self.parse_precedence(Precedence::Prefix)?;
        let span = start_span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// Comma-separated expressions up to and including `end`. A trailing comma is allowed.
    fn parse_expression_list(&mut self, end: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if !self.check(end) {
            loop {
                items.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
                if self.check(end) {
                    break;
                }
            }
        }
        self.expect(end)?;
        Ok(items)
    }

    fn parse_hash(&mut self, start_span: Span) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression()?;
                pairs.push((key, value));

                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RightBrace) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn parse_if(&mut self, start_span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;

        let consequence = self.block()?;
        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn parse_function(&mut self, start_span: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let mut parameters = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                parameters.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::Function {
                parameters,
                body,
                name: None,
            },
            span,
        ))
    }
}
