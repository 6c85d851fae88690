//! Function translations, one module per function group.
//!
//! Every handler receives the translated input collection on the
//! [`CallSite`] and translates its own arguments: plain arguments against the
//! enclosing focus, lambda arguments once per input item through
//! [`Translator::lambda`].

pub(crate) mod aggregate;
pub(crate) mod combining;
pub(crate) mod conversion;
pub(crate) mod datetime;
pub(crate) mod existence;
pub(crate) mod filtering;
pub(crate) mod math;
pub(crate) mod strings;
pub(crate) mod subsetting;
pub(crate) mod types;

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::function_registry::CallSite;
use super::value::SqlValue;
use super::{node_context, Translator};

impl Translator {
    /// Translate plain argument `index` against the enclosing focus.
    pub(crate) fn argument(
        &self,
        ctx: &mut TranslationContext,
        site: &CallSite<'_>,
        index: usize,
    ) -> TranslatorResult<SqlValue> {
        let arg = site.args.get(index).ok_or_else(|| {
            TranslatorError::arity(site.name, index + 1, index + 1, site.args.len())
        })?;
        self.inline(arg, ctx)
    }

    pub(crate) fn optional_argument(
        &self,
        ctx: &mut TranslationContext,
        site: &CallSite<'_>,
        index: usize,
    ) -> TranslatorResult<Option<SqlValue>> {
        match site.args.get(index) {
            Some(arg) => self.inline(arg, ctx).map(Some),
            None => Ok(None),
        }
    }

    /// A type specifier argument (`ofType(Quantity)`).
    pub(crate) fn type_argument(&self, site: &CallSite<'_>, index: usize) -> TranslatorResult<String> {
        site.args
            .get(index)
            .and_then(|arg| arg.as_type_name())
            .ok_or_else(|| {
                TranslatorError::invalid_with_context(
                    node_context(site.node),
                    format!("`{}` expects a type name", site.name),
                )
            })
    }

    /// A string-literal argument (`encode('base64')`).
    pub(crate) fn literal_argument(
        &self,
        ctx: &mut TranslationContext,
        site: &CallSite<'_>,
        index: usize,
    ) -> TranslatorResult<String> {
        let value = self.argument(ctx, site, index)?;
        value
            .literal
            .as_ref()
            .and_then(|literal| literal.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TranslatorError::invalid_with_context(
                    node_context(site.node),
                    format!("argument {} of `{}` must be a string literal", index + 1, site.name),
                )
            })
    }

    /// Unnested items of the call's input: `(FROM item, element value, index sql)`.
    pub(crate) fn iterate(
        &self,
        ctx: &mut TranslationContext,
        site: &CallSite<'_>,
    ) -> (String, SqlValue, String) {
        let alias = ctx.next_alias("elem");
        let from = self.elements_from(&site.base, &alias);
        let element = self.element_of(&site.base, &alias);
        (from, element, format!("{}.idx", alias))
    }
}
