//! Binary and unary operators.
//!
//! Operands follow FHIRPath singleton evaluation: a collection operand
//! contributes its first item, and an empty operand (SQL NULL) makes the
//! result empty. The boolean operators rely on SQL's three-valued logic,
//! which matches FHIRPath's for `and`, `or`, `xor` and `implies`.

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::fragment::{Shape, ValueKind};
use super::value::SqlValue;
use super::{node_context, Translator};
use crate::ast::{AstNode, BinaryOperator, UnaryOperator};
use crate::dialect::{DateUnit, MathFunction};

impl Translator {
    pub(crate) fn visit_binary(
        &self,
        op: BinaryOperator,
        left: &AstNode,
        right: &AstNode,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let l = self.inline(left, ctx)?;
        let r = self.inline(right, ctx)?;
        self.binary_values(op, &l, &r, node, ctx)
    }

    pub(crate) fn binary_values(
        &self,
        op: BinaryOperator,
        l: &SqlValue,
        r: &SqlValue,
        node: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        use BinaryOperator::*;
        match op {
            Union => Ok(self.union(l, r)),
            And | Or | Xor | Implies => Ok(self.logical(op, l, r)),
            In => self.membership(l, r, ctx),
            Contains => self.membership(r, l, ctx),
            _ if l.is_null_literal() || r.is_null_literal() => Ok(SqlValue::null()),
            Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                Ok(self.compare(op, l, r))
            }
            Equivalent => Ok(self.equivalent(l, r)),
            NotEquivalent => Ok(SqlValue::boolean(
                self.dialect().not(&self.equivalent(l, r).sql),
            )),
            Concat => {
                let d = self.dialect();
                let parts = [
                    d.coalesce(&[self.as_text(l), "''".to_string()]),
                    d.coalesce(&[self.as_text(r), "''".to_string()]),
                ];
                Ok(SqlValue::scalar(d.string_concat(&parts), ValueKind::Text))
            }
            Multiply | Divide | Div | Mod | Add | Subtract => self.arithmetic(op, l, r, node),
        }
    }

    /// `a | b`: concatenation keeping order and duplicates
    pub(crate) fn union(&self, l: &SqlValue, r: &SqlValue) -> SqlValue {
        let sql = self
            .dialect()
            .json_array_concat(&self.as_collection(l), &self.as_collection(r));
        let fhir_type = match (l.type_name(), r.type_name()) {
            (Some(a), Some(b)) if a == b => Some(a.to_string()),
            (Some(a), None) if r.is_null_literal() => Some(a.to_string()),
            (None, Some(b)) if l.is_null_literal() => Some(b.to_string()),
            _ => None,
        };
        SqlValue::json_collection(sql).with_type(fhir_type)
    }

    fn logical(&self, op: BinaryOperator, l: &SqlValue, r: &SqlValue) -> SqlValue {
        let d = self.dialect();
        let (a, b) = (self.logical_operand(l), self.logical_operand(r));
        let sql = match op {
            BinaryOperator::And => d.and(&a, &b),
            BinaryOperator::Or => d.or(&a, &b),
            BinaryOperator::Xor => d.comparison(&a, "<>", &b),
            _ => d.or(&d.not(&a), &b),
        };
        SqlValue::boolean(sql)
    }

    fn logical_operand(&self, value: &SqlValue) -> String {
        if value.is_null_literal() {
            // typed so both engines accept it inside boolean expressions
            "CAST(NULL AS BOOLEAN)".to_string()
        } else {
            self.as_boolean(value)
        }
    }

    pub(crate) fn compare(&self, op: BinaryOperator, l: &SqlValue, r: &SqlValue) -> SqlValue {
        let d = self.dialect();
        let token = match op {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            other => other.as_str(),
        };
        if self.is_quantity(l) && self.is_quantity(r) {
            let (a, b) = (self.quantity_value(l), self.quantity_value(r));
            return SqlValue::boolean(d.comparison(&a, token, &b));
        }
        let kind = self.comparison_kind(l, r);
        let (a, b) = if kind == ValueKind::Json {
            (self.to_json(l), self.to_json(r))
        } else {
            (self.coerce(l, kind), self.coerce(r, kind))
        };
        SqlValue::boolean(d.comparison(&a, token, &b))
    }

    /// `~`: case- and whitespace-insensitive for text; two empties are equivalent.
    fn equivalent(&self, l: &SqlValue, r: &SqlValue) -> SqlValue {
        let d = self.dialect();
        let kind = self.comparison_kind(l, r);
        let (a, b) = match kind {
            ValueKind::Text => (
                d.lower(&d.trim(&self.as_text(l))),
                d.lower(&d.trim(&self.as_text(r))),
            ),
            ValueKind::Json => (self.to_json(l), self.to_json(r)),
            other => (self.coerce(l, other), self.coerce(r, other)),
        };
        let both_empty = format!("({} IS NULL AND {} IS NULL)", a, b);
        SqlValue::boolean(d.coalesce(&[d.comparison(&a, "=", &b), both_empty]))
    }

    /// `item in collection`
    fn membership(
        &self,
        item: &SqlValue,
        collection: &SqlValue,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        if item.is_null_literal() {
            return Ok(SqlValue::null());
        }
        let d = self.dialect();
        let alias = ctx.next_alias("elem");
        let element = self.element_of(collection, &alias);
        let matches = self.compare(BinaryOperator::Equal, &element, item);
        let subquery = format!(
            "SELECT 1 FROM {} WHERE {}",
            d.unnest_table(&self.as_collection(collection), &alias),
            matches.sql
        );
        let probe = self.single(item);
        let sql = d.case_when(
            &[(format!("{} IS NULL", probe.sql), "NULL".to_string())],
            Some(&d.exists(&subquery)),
        );
        Ok(SqlValue::boolean(sql))
    }

    fn arithmetic(
        &self,
        op: BinaryOperator,
        l: &SqlValue,
        r: &SqlValue,
        node: &AstNode,
    ) -> TranslatorResult<SqlValue> {
        let d = self.dialect();
        let left_kind = self.effective_kind(l);
        let right_kind = self.effective_kind(r);

        if matches!(op, BinaryOperator::Add | BinaryOperator::Subtract)
            && left_kind.is_temporal()
            && self.is_quantity(r)
        {
            return self.date_arithmetic(op, l, r, left_kind, node);
        }
        if op == BinaryOperator::Add && (left_kind == ValueKind::Text || right_kind == ValueKind::Text)
        {
            let sql = d.string_concat(&[self.as_text(l), self.as_text(r)]);
            return Ok(SqlValue::scalar(sql, ValueKind::Text));
        }

        let (a, b) = (self.as_number(l), self.as_number(r));
        let integral = left_kind == ValueKind::Integer && right_kind == ValueKind::Integer;
        let nonzero = format!("NULLIF({}, 0)", b);
        let (sql, kind) = match op {
            BinaryOperator::Add => (format!("({} + {})", a, b), integral),
            BinaryOperator::Subtract => (format!("({} - {})", a, b), integral),
            BinaryOperator::Multiply => (format!("({} * {})", a, b), integral),
            BinaryOperator::Divide => (format!("({} * 1.0 / {})", a, nonzero), false),
            BinaryOperator::Div => (
                d.math_function(MathFunction::IntegerDivide, &[a, nonzero]),
                true,
            ),
            _ => (d.math_function(MathFunction::Modulo, &[a, nonzero]), integral),
        };
        let kind = if kind {
            ValueKind::Integer
        } else {
            ValueKind::Decimal
        };
        Ok(SqlValue::scalar(sql, kind))
    }

    /// `@2020-01-01 + 1 month`
    fn date_arithmetic(
        &self,
        op: BinaryOperator,
        l: &SqlValue,
        r: &SqlValue,
        left_kind: ValueKind,
        node: &AstNode,
    ) -> TranslatorResult<SqlValue> {
        let quantity = r.literal.as_ref().ok_or_else(|| {
            TranslatorError::unsupported("date arithmetic with a non-literal quantity")
        })?;
        let unit_text = quantity["unit"].as_str().unwrap_or_default();
        let unit = DateUnit::parse(unit_text).ok_or_else(|| {
            TranslatorError::invalid_with_context(
                node_context(node),
                format!("`{}` is not a calendar duration unit", unit_text),
            )
        })?;
        let amount = quantity["value"].to_string();
        let amount = if op == BinaryOperator::Subtract {
            format!("-{}", amount)
        } else {
            amount
        };
        let (value, kind) = match left_kind {
            ValueKind::Date if !Self::is_sub_day(unit) => (self.as_date(l), ValueKind::Date),
            ValueKind::Time => (self.as_time(l), ValueKind::Time),
            _ => (self.as_datetime(l), ValueKind::DateTime),
        };
        let mut sql = self.dialect().date_add(&value, &amount, unit);
        if kind == ValueKind::Date {
            sql = format!("CAST({} AS DATE)", sql);
        }
        Ok(SqlValue::scalar(sql, kind))
    }

    fn is_sub_day(unit: DateUnit) -> bool {
        matches!(
            unit,
            DateUnit::Hour | DateUnit::Minute | DateUnit::Second | DateUnit::Millisecond
        )
    }

    fn is_quantity(&self, value: &SqlValue) -> bool {
        value.kind == ValueKind::Json && value.type_name() == Some("Quantity")
    }

    fn quantity_value(&self, value: &SqlValue) -> String {
        let item = self.single(value);
        let field = SqlValue::json_item(self.dialect().json_extract(&item.sql, "value"));
        self.as_number(&field)
    }

    pub(crate) fn visit_unary(
        &self,
        op: UnaryOperator,
        operand: &AstNode,
        ctx: &mut TranslationContext,
    ) -> TranslatorResult<SqlValue> {
        let value = self.inline(operand, ctx)?;
        if op == UnaryOperator::Plus || value.is_null_literal() {
            return Ok(value);
        }
        let kind = match self.effective_kind(&value) {
            ValueKind::Integer => ValueKind::Integer,
            _ => ValueKind::Decimal,
        };
        let number = self.as_number(&value);
        Ok(SqlValue::new(format!("(-{})", number), kind, Shape::Item)
            .with_type(kind.fhir_type().map(str::to_string)))
    }
}
