use std::cmp::Ordering;

const XSD_PREFIX: &str = "http://www.w3.org/2001/XMLSchema#";

const XSD_NUMERIC_TYPES: [&str; 16] = [
    "integer",
    "decimal",
    "double",
    "float",
    "int",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "positiveInteger",
    "negativeInteger",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
    "unsignedByte",
];

/// Parsed form of a term string, ordered the way SPARQL `ORDER BY` orders RDF terms:
/// unbound < blank nodes < IRIs < numeric literals < other literals.
#[derive(Debug, Clone)]
pub enum RankValue {
    Unbound,
    Blank(String),
    Iri(String),
    Numeric(f64),
    Literal { lexical: String, annotation: String },
}

impl RankValue {
    #[must_use]
    pub fn parse(term: &str) -> Self {
        if let Some(label) = term.strip_prefix("_:") {
            return Self::Blank(label.to_string());
        }

        if let Some(iri) = term.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
            return Self::Iri(iri.to_string());
        }

        if term.starts_with("http://") || term.starts_with("https://") || term.starts_with("urn:") {
            return Self::Iri(term.to_string());
        }

        if let Some((lexical, annotation)) = split_literal(term) {
            if is_numeric_datatype(annotation) {
                if let Some(number) = parse_number(lexical) {
                    return Self::Numeric(number);
                }
            }
            return Self::Literal {
                lexical: lexical.to_string(),
                annotation: annotation.to_string(),
            };
        }

        match parse_number(term) {
            Some(number) => Self::Numeric(number),
            None => Self::Literal { lexical: term.to_string(), annotation: String::new() },
        }
    }

    #[must_use]
    pub fn from_term(term: Option<&str>) -> Self {
        term.map_or(Self::Unbound, Self::parse)
    }

    fn category(&self) -> u8 {
        match self {
            Self::Unbound => 0,
            Self::Blank(_) => 1,
            Self::Iri(_) => 2,
            Self::Numeric(_) => 3,
            Self::Literal { .. } => 4,
        }
    }
}

impl PartialEq for RankValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankValue {}

impl PartialOrd for RankValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unbound, Self::Unbound) => Ordering::Equal,
            (Self::Blank(lhs), Self::Blank(rhs)) | (Self::Iri(lhs), Self::Iri(rhs)) => lhs.cmp(rhs),
            (Self::Numeric(lhs), Self::Numeric(rhs)) => lhs.total_cmp(rhs),
            (
                Self::Literal { lexical: lhs_lexical, annotation: lhs_annotation },
                Self::Literal { lexical: rhs_lexical, annotation: rhs_annotation },
            ) => lhs_lexical.cmp(rhs_lexical).then_with(|| lhs_annotation.cmp(rhs_annotation)),
            _ => self.category().cmp(&other.category()),
        }
    }
}

/// Splits `"lexical"^^datatype` / `"lexical"@lang` / `"lexical"` into its lexical form and
/// annotation. Returns `None` when the term is not a quoted literal.
fn split_literal(term: &str) -> Option<(&str, &str)> {
    let rest = term.strip_prefix('"')?;
    let closing = rest.rfind('"')?;
    Some((&rest[..closing], &rest[closing + 1..]))
}

fn is_numeric_datatype(annotation: &str) -> bool {
    let Some(datatype) = annotation.strip_prefix("^^") else {
        return false;
    };
    let datatype = datatype.trim_start_matches('<').trim_end_matches('>');
    let local = datatype
        .strip_prefix(XSD_PREFIX)
        .or_else(|| datatype.strip_prefix("xsd:"))
        .unwrap_or(datatype);
    XSD_NUMERIC_TYPES.contains(&local)
}

fn parse_number(lexical: &str) -> Option<f64> {
    let trimmed = lexical.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
}

/// Lexical form of a term, as SPARQL `STR()` would produce it.
#[must_use]
pub fn lexical_form(term: &str) -> &str {
    if let Some(iri) = term.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        return iri;
    }
    split_literal(term).map_or(term, |(lexical, _)| lexical)
}

/// Removes the surrounding quotes of a plain literal (`"abc"` becomes `abc`); any other term
/// is returned as-is.
#[must_use]
pub fn unquote_plain_literal(term: &str) -> &str {
    if term.len() >= 2 && term.starts_with('"') && term.ends_with('"') {
        &term[1..term.len() - 1]
    } else {
        term
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_terms_compare_by_value_not_text() {
        assert!(RankValue::parse("10") > RankValue::parse("9"));
        assert!(
            RankValue::parse("\"2.5\"^^http://www.w3.org/2001/XMLSchema#decimal")
                < RankValue::parse("\"10\"^^<http://www.w3.org/2001/XMLSchema#integer>")
        );
        assert_eq!(RankValue::parse("\"3\"^^xsd:integer"), RankValue::parse("3.0"));
    }

    #[test]
    fn term_categories_follow_sparql_order() {
        let ordered = [
            RankValue::Unbound,
            RankValue::parse("_:b0"),
            RankValue::parse("http://example.org/a"),
            RankValue::parse("42"),
            RankValue::parse("\"apple\""),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn literals_compare_lexically_then_by_annotation() {
        assert!(RankValue::parse("\"apple\"") < RankValue::parse("\"banana\""));
        assert!(RankValue::parse("\"chat\"@en") < RankValue::parse("\"chat\"@fr"));
        assert!(RankValue::parse("banana") > RankValue::parse("apple"));
    }

    #[test]
    fn non_numeric_typed_literal_is_not_numeric() {
        let value = RankValue::parse("\"12\"^^http://www.w3.org/2001/XMLSchema#string");
        assert!(matches!(value, RankValue::Literal { .. }));
    }

    #[test]
    fn lexical_form_strips_quotes_datatypes_and_brackets() {
        assert_eq!(lexical_form("\"42\"^^xsd:integer"), "42");
        assert_eq!(lexical_form("\"hello\"@en"), "hello");
        assert_eq!(lexical_form("<http://example.org/a>"), "http://example.org/a");
        assert_eq!(lexical_form("http://example.org/a"), "http://example.org/a");
    }

    #[test]
    fn unquote_only_touches_plain_literals() {
        assert_eq!(unquote_plain_literal("\"abc\""), "abc");
        assert_eq!(unquote_plain_literal("\"abc\"@en"), "\"abc\"@en");
        assert_eq!(unquote_plain_literal("http://example.org/a"), "http://example.org/a");
        assert_eq!(unquote_plain_literal("\""), "\"");
    }
}
