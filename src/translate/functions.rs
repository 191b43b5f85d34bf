//! Function translation table
//!
//! Straight renames live in [`RENAMES`] and column aggregates in
//! [`AGGREGATES`]. Functions whose arguments change shape are handled by the
//! translator; this module only knows their names.

/// A function that maps one-to-one onto a DAX function
pub(crate) struct Rename {
    pub source: &'static str,
    pub target: &'static str,
    pub min_args: usize,
    pub max_args: usize,
}

const fn rename(
    source: &'static str,
    target: &'static str,
    min_args: usize,
    max_args: usize,
) -> Rename {
    Rename {
        source,
        target,
        min_args,
        max_args,
    }
}

pub(crate) const RENAMES: &[Rename] = &[
    // Two-argument MIN/MAX compare scalars
    rename("MIN", "MIN", 2, 2),
    rename("MAX", "MAX", 2, 2),
    // Logical
    rename("IIF", "IF", 3, 3),
    rename("ISNULL", "ISBLANK", 1, 1),
    rename("IFNULL", "COALESCE", 2, 2),
    // Number
    rename("ABS", "ABS", 1, 1),
    rename("SQRT", "SQRT", 1, 1),
    rename("EXP", "EXP", 1, 1),
    rename("LN", "LN", 1, 1),
    rename("POWER", "POWER", 2, 2),
    rename("SIGN", "SIGN", 1, 1),
    rename("INT", "INT", 1, 1),
    rename("DIV", "QUOTIENT", 2, 2),
    rename("PI", "PI", 0, 0),
    // String
    rename("LEN", "LEN", 1, 1),
    rename("LEFT", "LEFT", 2, 2),
    rename("RIGHT", "RIGHT", 2, 2),
    rename("UPPER", "UPPER", 1, 1),
    rename("LOWER", "LOWER", 1, 1),
    rename("TRIM", "TRIM", 1, 1),
    rename("CONTAINS", "CONTAINSSTRING", 2, 2),
    rename("REPLACE", "SUBSTITUTE", 3, 3),
    // Date
    rename("YEAR", "YEAR", 1, 1),
    rename("MONTH", "MONTH", 1, 1),
    rename("DAY", "DAY", 1, 1),
    rename("TODAY", "TODAY", 0, 0),
    rename("NOW", "NOW", 0, 0),
    rename("MAKEDATE", "DATE", 3, 3),
];

pub(crate) fn find_rename(name: &str) -> Option<&'static Rename> {
    RENAMES.iter().find(|r| r.source == name)
}

/// A one-argument aggregate. DAX only accepts a column reference in the
/// plain form; anything else needs the row iterator over the column's table.
pub(crate) struct Aggregate {
    pub source: &'static str,
    pub column_form: &'static str,
    pub iterator_form: Option<&'static str>,
}

const fn aggregate(
    source: &'static str,
    column_form: &'static str,
    iterator_form: Option<&'static str>,
) -> Aggregate {
    Aggregate {
        source,
        column_form,
        iterator_form,
    }
}

pub(crate) const AGGREGATES: &[Aggregate] = &[
    aggregate("SUM", "SUM", Some("SUMX")),
    aggregate("AVG", "AVERAGE", Some("AVERAGEX")),
    aggregate("COUNT", "COUNT", Some("COUNTX")),
    aggregate("COUNTD", "DISTINCTCOUNT", None),
    aggregate("MIN", "MIN", Some("MINX")),
    aggregate("MAX", "MAX", Some("MAXX")),
    aggregate("MEDIAN", "MEDIAN", Some("MEDIANX")),
    aggregate("STDEV", "STDEV.S", Some("STDEVX.S")),
    aggregate("STDEVP", "STDEV.P", Some("STDEVX.P")),
    aggregate("VAR", "VAR.S", Some("VARX.S")),
    aggregate("VARP", "VAR.P", Some("VARX.P")),
];

pub(crate) fn find_aggregate(name: &str) -> Option<&'static Aggregate> {
    AGGREGATES.iter().find(|a| a.source == name)
}

const TABLE_CALCULATIONS: &[&str] = &[
    "LOOKUP",
    "INDEX",
    "FIRST",
    "LAST",
    "SIZE",
    "TOTAL",
    "PREVIOUS_VALUE",
];

/// Functions evaluated over the visual's partition, which a measure cannot see
pub(crate) fn is_table_calculation(name: &str) -> bool {
    TABLE_CALCULATIONS.contains(&name)
        || name.starts_with("RUNNING_")
        || name.starts_with("WINDOW_")
        || name.starts_with("RANK")
}

/// Known functions that are refused with a specific reason
pub(crate) fn refusal(name: &str) -> Option<&'static str> {
    let reason = match name {
        "ATTR" => "ATTR depends on the visual's level of detail",
        "DATETRUNC" | "DATENAME" => {
            "date truncation and naming depend on locale and fiscal settings"
        }
        "LTRIM" | "RTRIM" => "DAX only trims both ends",
        n if n.starts_with("REGEXP_") => "regular expressions are not available in DAX",
        n if n.starts_with("RAWSQL") => "pass-through SQL cannot run inside a measure",
        "USERNAME" | "FULLNAME" | "USERDOMAIN" | "ISMEMBEROF" | "ISUSERNAME" => {
            "user functions map to row-level security, not measures"
        }
        _ => return None,
    };
    Some(reason)
}

/// Date part named by a string literal argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatePart {
    Year,
    Quarter,
    Month,
    Week,
    Weekday,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub(crate) fn parse(literal: &str) -> Option<Self> {
        let part = match literal.trim().to_ascii_lowercase().as_str() {
            "year" => DatePart::Year,
            "quarter" => DatePart::Quarter,
            "month" => DatePart::Month,
            "week" => DatePart::Week,
            "weekday" => DatePart::Weekday,
            "day" => DatePart::Day,
            "hour" => DatePart::Hour,
            "minute" => DatePart::Minute,
            "second" => DatePart::Second,
            _ => return None,
        };
        Some(part)
    }

    /// Interval keyword for DATEDIFF
    pub(crate) fn interval(self) -> Option<&'static str> {
        match self {
            DatePart::Year => Some("YEAR"),
            DatePart::Quarter => Some("QUARTER"),
            DatePart::Month => Some("MONTH"),
            DatePart::Week => Some("WEEK"),
            DatePart::Day => Some("DAY"),
            DatePart::Hour => Some("HOUR"),
            DatePart::Minute => Some("MINUTE"),
            DatePart::Second => Some("SECOND"),
            DatePart::Weekday => None,
        }
    }

    /// Single-argument extraction function for DATEPART
    pub(crate) fn extractor(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Quarter => "QUARTER",
            DatePart::Month => "MONTH",
            DatePart::Week => "WEEKNUM",
            DatePart::Weekday => "WEEKDAY",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}
