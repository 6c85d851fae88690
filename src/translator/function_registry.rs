/// FHIRPath Function Registry
///
/// Maps each supported FHIRPath function to its arity, category and the
/// handler that translates a call. Arity is checked here before any argument
/// is translated.
use std::collections::HashMap;
use std::fmt;

use super::context::TranslationContext;
use super::errors::{TranslatorError, TranslatorResult};
use super::functions::{
    aggregate, combining, conversion, datetime, existence, filtering, math, strings,
    subsetting, types,
};
use super::value::SqlValue;
use super::Translator;
use crate::ast::AstNode;

/// Group a function is documented under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCategory {
    Existence,
    Filtering,
    Subsetting,
    Combining,
    Conversion,
    String,
    Math,
    Aggregate,
    Type,
    Utility,
    DateTime,
}

/// One call being translated
pub struct CallSite<'a> {
    pub name: &'a str,
    /// The input collection (`Patient.name` in `Patient.name.first()`)
    pub base: SqlValue,
    pub args: &'a [AstNode],
    pub node: &'a AstNode,
}

pub type FunctionHandler =
    fn(&Translator, &mut TranslationContext, &CallSite<'_>) -> TranslatorResult<SqlValue>;

/// Function table entry
#[derive(Clone)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: FunctionCategory,
    pub min_args: usize,
    pub max_args: usize,
    /// Consumes the whole input collection rather than one item at a time
    pub whole_collection: bool,
    pub handler: FunctionHandler,
}

impl FunctionSpec {
    pub fn check_arity(&self, actual: usize) -> TranslatorResult<()> {
        if actual < self.min_args || actual > self.max_args {
            return Err(TranslatorError::arity(
                self.name,
                self.min_args,
                self.max_args,
                actual,
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("whole_collection", &self.whole_collection)
            .finish()
    }
}

/// Get the table entry for a FHIRPath function (names are case-sensitive)
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.get(name)
}

/// All registered function names, sorted
pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = FUNCTIONS.keys().copied().collect();
    names.sort_unstable();
    names
}

fn spec(
    name: &'static str,
    category: FunctionCategory,
    args: (usize, usize),
    whole_collection: bool,
    handler: FunctionHandler,
) -> FunctionSpec {
    FunctionSpec {
        name,
        category,
        min_args: args.0,
        max_args: args.1,
        whole_collection,
        handler,
    }
}

// Static function table
lazy_static::lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionSpec> = {
        use FunctionCategory::*;
        let mut m = HashMap::new();
        let mut add = |s: FunctionSpec| {
            m.insert(s.name, s);
        };

        // ===== EXISTENCE =====

        add(spec("empty", Existence, (0, 0), true, existence::empty));
        add(spec("exists", Existence, (0, 1), true, existence::exists));
        add(spec("all", Existence, (1, 1), true, existence::all));
        add(spec("allTrue", Existence, (0, 0), true, existence::all_true));
        add(spec("anyTrue", Existence, (0, 0), true, existence::any_true));
        add(spec("allFalse", Existence, (0, 0), true, existence::all_false));
        add(spec("anyFalse", Existence, (0, 0), true, existence::any_false));
        add(spec("subsetOf", Existence, (1, 1), true, existence::subset_of));
        add(spec("supersetOf", Existence, (1, 1), true, existence::superset_of));
        add(spec("count", Existence, (0, 0), true, existence::count));
        add(spec("distinct", Existence, (0, 0), true, existence::distinct));
        add(spec("isDistinct", Existence, (0, 0), true, existence::is_distinct));
        // hasValue() is per item: a primitive with a value
        add(spec("hasValue", Existence, (0, 0), false, existence::has_value));

        // ===== FILTERING AND PROJECTION =====

        add(spec("where", Filtering, (1, 1), true, filtering::where_items));
        add(spec("select", Filtering, (1, 1), true, filtering::select_items));
        add(spec("repeat", Filtering, (1, 1), true, filtering::repeat_items));
        add(spec("ofType", Filtering, (1, 1), true, types::of_type));

        // ===== SUBSETTING =====

        add(spec("first", Subsetting, (0, 0), true, subsetting::first));
        add(spec("last", Subsetting, (0, 0), true, subsetting::last));
        add(spec("tail", Subsetting, (0, 0), true, subsetting::tail));
        add(spec("skip", Subsetting, (1, 1), true, subsetting::skip));
        add(spec("take", Subsetting, (1, 1), true, subsetting::take));
        add(spec("single", Subsetting, (0, 0), true, subsetting::single));
        add(spec("intersect", Subsetting, (1, 1), true, combining::intersect));
        add(spec("exclude", Subsetting, (1, 1), true, combining::exclude));

        // ===== COMBINING =====

        add(spec("union", Combining, (1, 1), true, combining::union));
        add(spec("combine", Combining, (1, 1), true, combining::combine));

        // ===== CONVERSION =====

        add(spec("iif", Conversion, (2, 3), false, conversion::iif));
        add(spec("toString", Conversion, (0, 0), false, conversion::to_string));
        add(spec("toInteger", Conversion, (0, 0), false, conversion::to_integer));
        add(spec("toDecimal", Conversion, (0, 0), false, conversion::to_decimal));
        add(spec("toBoolean", Conversion, (0, 0), false, conversion::to_boolean));
        add(spec("toDate", Conversion, (0, 0), false, conversion::to_date));
        add(spec("toDateTime", Conversion, (0, 0), false, conversion::to_datetime));
        add(spec("toTime", Conversion, (0, 0), false, conversion::to_time));
        add(spec("convertsToString", Conversion, (0, 0), false, conversion::converts_to_string));
        add(spec("convertsToInteger", Conversion, (0, 0), false, conversion::converts_to_integer));
        add(spec("convertsToDecimal", Conversion, (0, 0), false, conversion::converts_to_decimal));
        add(spec("convertsToBoolean", Conversion, (0, 0), false, conversion::converts_to_boolean));
        add(spec("convertsToDate", Conversion, (0, 0), false, conversion::converts_to_date));
        add(spec("convertsToDateTime", Conversion, (0, 0), false, conversion::converts_to_datetime));

        // ===== STRING =====

        add(spec("indexOf", String, (1, 1), false, strings::index_of));
        add(spec("substring", String, (1, 2), false, strings::substring));
        add(spec("startsWith", String, (1, 1), false, strings::starts_with));
        add(spec("endsWith", String, (1, 1), false, strings::ends_with));
        add(spec("contains", String, (1, 1), false, strings::contains));
        add(spec("upper", String, (0, 0), false, strings::upper));
        add(spec("lower", String, (0, 0), false, strings::lower));
        add(spec("replace", String, (2, 2), false, strings::replace));
        add(spec("matches", String, (1, 1), false, strings::matches));
        add(spec("replaceMatches", String, (2, 2), false, strings::replace_matches));
        add(spec("length", String, (0, 0), false, strings::length));
        add(spec("toChars", String, (0, 0), false, strings::to_chars));
        add(spec("split", String, (1, 1), false, strings::split));
        add(spec("join", String, (0, 1), true, strings::join));
        add(spec("trim", String, (0, 0), false, strings::trim));
        add(spec("encode", String, (1, 1), false, strings::encode));
        add(spec("decode", String, (1, 1), false, strings::decode));

        // ===== MATH =====

        add(spec("abs", Math, (0, 0), false, math::abs));
        add(spec("ceiling", Math, (0, 0), false, math::ceiling));
        add(spec("floor", Math, (0, 0), false, math::floor));
        add(spec("round", Math, (0, 1), false, math::round));
        add(spec("sqrt", Math, (0, 0), false, math::sqrt));
        add(spec("ln", Math, (0, 0), false, math::ln));
        add(spec("log", Math, (1, 1), false, math::log));
        add(spec("exp", Math, (0, 0), false, math::exp));
        add(spec("power", Math, (1, 1), false, math::power));
        add(spec("truncate", Math, (0, 0), false, math::truncate));

        // ===== AGGREGATES =====

        add(spec("sum", Aggregate, (0, 0), true, aggregate::sum));
        add(spec("avg", Aggregate, (0, 0), true, aggregate::avg));
        add(spec("min", Aggregate, (0, 0), true, aggregate::min));
        add(spec("max", Aggregate, (0, 0), true, aggregate::max));
        add(spec("aggregate", Aggregate, (1, 2), true, aggregate::fold));

        // ===== TYPES =====

        add(spec("is", Type, (1, 1), false, types::is));
        add(spec("as", Type, (1, 1), false, types::as_type));

        // ===== UTILITY =====

        add(spec("now", Utility, (0, 0), false, datetime::now));
        add(spec("today", Utility, (0, 0), false, datetime::today));
        add(spec("timeOfDay", Utility, (0, 0), false, datetime::time_of_day));
        add(spec("not", Utility, (0, 0), false, conversion::not));
        add(spec("trace", Utility, (1, 2), false, conversion::trace));

        // ===== DATE DIFFERENCES =====

        add(spec("duration", DateTime, (2, 2), false, datetime::duration));
        add(spec("difference", DateTime, (2, 2), false, datetime::difference));

        m
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(lookup("where").is_some());
        assert!(lookup("ofType").is_some());
        assert!(lookup("oftype").is_none());
    }

    #[test]
    fn test_arity_checks() {
        let substring = lookup("substring").unwrap();
        assert!(substring.check_arity(1).is_ok());
        assert!(substring.check_arity(2).is_ok());
        assert_eq!(
            substring.check_arity(0).unwrap_err(),
            TranslatorError::arity("substring", 1, 2, 0)
        );
        assert!(lookup("count").unwrap().check_arity(1).is_err());
    }

    #[test]
    fn test_whole_collection_flags() {
        for name in ["count", "first", "where", "select", "aggregate", "union", "join"] {
            assert!(lookup(name).unwrap().whole_collection, "{}", name);
        }
        for name in ["upper", "substring", "toInteger", "is", "not", "iif"] {
            assert!(!lookup(name).unwrap().whole_collection, "{}", name);
        }
    }

    #[test]
    fn test_function_library_is_complete() {
        let expected = [
            "empty", "exists", "all", "allTrue", "anyTrue", "allFalse", "anyFalse",
            "subsetOf", "supersetOf", "count", "distinct", "isDistinct", "hasValue",
            "where", "select", "repeat", "ofType",
            "first", "last", "tail", "skip", "take", "single", "intersect", "exclude",
            "union", "combine",
            "iif", "toString", "toInteger", "toDecimal", "toBoolean", "toDate", "toDateTime",
            "toTime", "convertsToString", "convertsToInteger", "convertsToDecimal",
            "convertsToBoolean", "convertsToDate", "convertsToDateTime",
            "indexOf", "substring", "startsWith", "endsWith", "contains", "upper", "lower",
            "replace", "matches", "replaceMatches", "length", "toChars", "split", "join",
            "trim", "encode", "decode",
            "abs", "ceiling", "floor", "round", "sqrt", "ln", "log", "exp", "power", "truncate",
            "sum", "avg", "min", "max", "aggregate",
            "is", "as",
            "now", "today", "timeOfDay", "not", "trace",
            "duration", "difference",
        ];
        for name in expected {
            assert!(lookup(name).is_some(), "missing `{}`", name);
        }
        assert_eq!(function_names().len(), expected.len());
    }
}
