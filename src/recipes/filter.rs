//! Translates loosely-typed query parameters into field predicates.
//!
//! Numeric parameters accept an optional comparison operator glued to a
//! decimal literal (`>=4.5`, `<400`, `=30`) or a bare literal meaning
//! equality. Anything else is dropped without failing the request.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Fields a predicate can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Cuisine,
    Serves,
    Rating,
    TotalTime,
    PrepTime,
    CookTime,
    /// Derived from `nutrients.calories` at query time.
    CaloriesNumeric,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Cuisine => "cuisine",
            Field::Serves => "serves",
            Field::Rating => "rating",
            Field::TotalTime => "total_time",
            Field::PrepTime => "prep_time",
            Field::CookTime => "cook_time",
            Field::CaloriesNumeric => "caloriesNumeric",
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Field::CaloriesNumeric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" => Some(CompareOp::Eq),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Lte),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Gte),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }

    pub fn test(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Gte => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring match; the pattern is taken literally.
    Contains(String),
    Compare { op: CompareOp, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: Field,
    pub predicate: Predicate,
}

/// Ordered conjunction of field predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    predicates: Vec<FieldPredicate>,
}

impl PredicateSet {
    pub fn iter(&self) -> impl Iterator<Item = &FieldPredicate> {
        self.predicates.iter()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn references_derived(&self) -> bool {
        self.predicates.iter().any(|p| p.field.is_derived())
    }

    fn push(&mut self, field: Field, predicate: Option<Predicate>) {
        if let Some(predicate) = predicate {
            self.predicates.push(FieldPredicate { field, predicate });
        }
    }
}

/// Raw filter parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub title: Option<String>,
    pub cuisine: Option<String>,
    pub serves: Option<String>,
    pub rating: Option<String>,
    pub total_time: Option<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub calories: Option<String>,
}

lazy_static! {
    static ref OPERATOR_RE: Regex = Regex::new(r"(<=|>=|=|<|>)(-?\d+(?:\.\d+)?)").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap();
}

/// Compiles search parameters into predicates, in a fixed field order.
pub fn compile(params: &FilterParams) -> PredicateSet {
    let mut set = PredicateSet::default();
    set.push(Field::Title, contains(params.title.as_deref()));
    set.push(Field::Cuisine, contains(params.cuisine.as_deref()));
    set.push(Field::Serves, contains(params.serves.as_deref()));
    set.push(Field::Rating, comparison(params.rating.as_deref()));
    set.push(Field::TotalTime, comparison(params.total_time.as_deref()));
    set.push(Field::PrepTime, comparison(params.prep_time.as_deref()));
    set.push(Field::CookTime, comparison(params.cook_time.as_deref()));
    set.push(Field::CaloriesNumeric, comparison(params.calories.as_deref()));
    set
}

/// The legacy `GET /recipes?name=` lookup only understands a title substring.
pub fn compile_name(name: Option<&str>) -> PredicateSet {
    let mut set = PredicateSet::default();
    set.push(Field::Title, contains(name));
    set
}

fn contains(raw: Option<&str>) -> Option<Predicate> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    Some(Predicate::Contains(raw.to_string()))
}

fn comparison(raw: Option<&str>) -> Option<Predicate> {
    let (op, value) = parse_comparison(raw?)?;
    Some(Predicate::Compare { op, value })
}

/// Parses `<op><number>` or a bare number (equality). Negative literals are
/// accepted as part of the number.
pub fn parse_comparison(raw: &str) -> Option<(CompareOp, f64)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(caps) = OPERATOR_RE.captures(raw) {
        let op = CompareOp::from_token(&caps[1])?;
        let value = finite(&caps[2])?;
        return Some((op, value));
    }
    if NUMBER_RE.is_match(raw) {
        return Some((CompareOp::Eq, finite(raw)?));
    }
    None
}

fn finite(literal: &str) -> Option<f64> {
    literal.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        let mut p = FilterParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "title" => p.title = v,
                "cuisine" => p.cuisine = v,
                "serves" => p.serves = v,
                "rating" => p.rating = v,
                "total_time" => p.total_time = v,
                "prep_time" => p.prep_time = v,
                "cook_time" => p.cook_time = v,
                "calories" => p.calories = v,
                other => panic!("unknown param {other}"),
            }
        }
        p
    }

    fn only(set: &PredicateSet) -> &FieldPredicate {
        assert_eq!(set.len(), 1, "expected one predicate, got {:?}", set);
        set.iter().next().unwrap()
    }

    #[test]
    fn rating_with_operator() {
        let set = compile(&params(&[("rating", ">=4.5")]));
        let p = only(&set);
        assert_eq!(p.field, Field::Rating);
        assert_eq!(
            p.predicate,
            Predicate::Compare { op: CompareOp::Gte, value: 4.5 }
        );
    }

    #[test]
    fn calories_binds_to_derived_field() {
        let set = compile(&params(&[("calories", "<=400")]));
        let p = only(&set);
        assert_eq!(p.field, Field::CaloriesNumeric);
        assert_eq!(p.field.name(), "caloriesNumeric");
        assert_eq!(
            p.predicate,
            Predicate::Compare { op: CompareOp::Lte, value: 400.0 }
        );
        assert!(set.references_derived());
    }

    #[test]
    fn bare_number_means_equality() {
        let set = compile(&params(&[("rating", "4")]));
        assert_eq!(
            only(&set).predicate,
            Predicate::Compare { op: CompareOp::Eq, value: 4.0 }
        );
        assert_eq!(parse_comparison("  30 "), Some((CompareOp::Eq, 30.0)));
    }

    #[test]
    fn malformed_values_are_dropped() {
        for raw in ["banana", "", "   ", ">=", "<=abc", "4.5abc", "1e3", "NaN", "inf"] {
            assert_eq!(parse_comparison(raw), None, "{raw:?} should not compile");
        }
        assert!(compile(&params(&[("rating", "banana")])).is_empty());
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(parse_comparison("<=10"), Some((CompareOp::Lte, 10.0)));
        assert_eq!(parse_comparison(">=10"), Some((CompareOp::Gte, 10.0)));
        assert_eq!(parse_comparison("<10"), Some((CompareOp::Lt, 10.0)));
        assert_eq!(parse_comparison(">10"), Some((CompareOp::Gt, 10.0)));
        assert_eq!(parse_comparison("=10"), Some((CompareOp::Eq, 10.0)));
    }

    #[test]
    fn first_operator_match_is_honored() {
        assert_eq!(parse_comparison(">5<3"), Some((CompareOp::Gt, 5.0)));
        assert_eq!(
            parse_comparison("about <=20 minutes"),
            Some((CompareOp::Lte, 20.0))
        );
    }

    #[test]
    fn negative_literals_are_accepted() {
        assert_eq!(parse_comparison("-5"), Some((CompareOp::Eq, -5.0)));
        assert_eq!(parse_comparison(">=-5"), Some((CompareOp::Gte, -5.0)));
        assert_eq!(parse_comparison("<-0.5"), Some((CompareOp::Lt, -0.5)));
    }

    #[test]
    fn substring_params_are_verbatim() {
        let set = compile(&params(&[("title", "Pie (Apple)"), ("cuisine", "  ")]));
        let p = only(&set);
        assert_eq!(p.field, Field::Title);
        assert_eq!(p.predicate, Predicate::Contains("Pie (Apple)".into()));
    }

    #[test]
    fn compile_is_deterministic_and_ordered() {
        let raw = params(&[
            ("calories", "<500"),
            ("title", "soup"),
            ("rating", ">=4"),
            ("serves", "4"),
            ("cook_time", "30"),
        ]);
        let first = compile(&raw);
        let second = compile(&raw);
        assert_eq!(first, second);
        let fields: Vec<Field> = first.iter().map(|p| p.field).collect();
        assert_eq!(
            fields,
            vec![
                Field::Title,
                Field::Serves,
                Field::Rating,
                Field::CookTime,
                Field::CaloriesNumeric
            ]
        );
    }

    #[test]
    fn name_lookup_only_targets_title() {
        let set = compile_name(Some("chicken"));
        assert_eq!(only(&set).field, Field::Title);
        assert!(compile_name(None).is_empty());
        assert!(compile_name(Some("")).is_empty());
    }

    #[test]
    fn compare_ops_evaluate() {
        assert!(CompareOp::Gte.test(4.5, 4.5));
        assert!(!CompareOp::Gt.test(4.5, 4.5));
        assert!(CompareOp::Lt.test(1.0, 2.0));
        assert!(CompareOp::Eq.test(3.0, 3.0));
    }
}
