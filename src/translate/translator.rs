//! DAX emission from the formula AST

use super::functions::{
    find_aggregate, find_rename, is_table_calculation, refusal, Aggregate, DatePart,
};
use super::parser::{parse_formula, BinaryOp, Expr, FieldRef};
use super::resolver::{FieldResolver, Resolved};
use super::TranslateError;
use chrono::Datelike;

/// Source functions whose result is text
const TEXT_FUNCTIONS: &[&str] = &[
    "LEFT", "RIGHT", "MID", "UPPER", "LOWER", "TRIM", "STR", "REPLACE",
];

/// Translates Tableau calculation formulas into DAX measure expressions
pub struct ExpressionTranslator<'a> {
    resolver: &'a FieldResolver,
}

impl<'a> ExpressionTranslator<'a> {
    pub fn new(resolver: &'a FieldResolver) -> Self {
        Self { resolver }
    }

    /// Translate a formula owned by `datasource`.
    ///
    /// Example:
    /// - Input: `[Profit]/[Sales]` in data source `Orders`
    /// - Output: `'Orders'[Profit]/'Orders'[Sales]`
    ///
    /// A missing or blank formula translates to an empty string.
    pub fn translate(
        &self,
        formula: Option<&str>,
        datasource: &str,
    ) -> Result<String, TranslateError> {
        let Some(formula) = formula else {
            return Ok(String::new());
        };
        match parse_formula(formula)? {
            Some(expr) => self.emit(&expr, datasource),
            None => Ok(String::new()),
        }
    }

    /// Emit DAX for an already parsed formula
    pub fn emit(&self, expr: &Expr, datasource: &str) -> Result<String, TranslateError> {
        Emitter {
            resolver: self.resolver,
            datasource,
        }
        .expr(expr)
    }
}

struct Emitter<'a> {
    resolver: &'a FieldResolver,
    datasource: &'a str,
}

impl Emitter<'_> {
    fn expr(&self, expr: &Expr) -> Result<String, TranslateError> {
        match expr {
            Expr::Number(n) => Ok(n.clone()),
            Expr::Text(s) => Ok(quote_text(s)),
            Expr::Boolean(true) => Ok("TRUE()".to_string()),
            Expr::Boolean(false) => Ok("FALSE()".to_string()),
            Expr::Null => Ok("BLANK()".to_string()),
            Expr::Date(date) => Ok(format!(
                "DATE({}, {}, {})",
                date.year(),
                date.month(),
                date.day()
            )),
            Expr::Field(field) => self.field(field),
            Expr::Negate(inner) => Ok(format!("-{}", self.expr(inner)?)),
            Expr::Not(inner) => {
                let inner = match inner.as_ref() {
                    Expr::Group(grouped) => grouped.as_ref(),
                    other => other,
                };
                Ok(format!("NOT({})", self.expr(inner)?))
            }
            Expr::Group(inner) => Ok(format!("({})", self.expr(inner)?)),
            Expr::Binary {
                op,
                left,
                right,
                spaced,
            } => self.binary(*op, left, right, *spaced),
            Expr::Call { name, args } => self.call(name, args),
            Expr::If {
                branches,
                otherwise,
            } => self.if_chain(branches, otherwise.as_deref()),
            Expr::Case {
                subject,
                arms,
                otherwise,
            } => {
                let mut parts = vec![self.expr(subject)?];
                for (value, result) in arms {
                    parts.push(self.expr(value)?);
                    parts.push(self.expr(result)?);
                }
                if let Some(other) = otherwise {
                    parts.push(self.expr(other)?);
                }
                Ok(format!("SWITCH({})", parts.join(", ")))
            }
        }
    }

    fn field(&self, field: &FieldRef) -> Result<String, TranslateError> {
        match self.resolver.resolve(self.datasource, field)? {
            Resolved::Column { table, column, .. } => Ok(format!(
                "{}[{}]",
                table_name(&table),
                column.replace(']', "]]")
            )),
            // Measures are referenced without table qualification
            Resolved::Measure { measure, .. } => Ok(format!("[{}]", measure.replace(']', "]]"))),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        spaced: bool,
    ) -> Result<String, TranslateError> {
        let symbol = match op {
            BinaryOp::Modulo => {
                return Ok(format!("MOD({}, {})", self.expr(left)?, self.expr(right)?));
            }
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Add if self.is_text(left) || self.is_text(right) => "&",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
        };

        let mut lhs = self.expr(left)?;
        // Tableau negates before raising to a power, DAX the other way round
        if op == BinaryOp::Power && matches!(left, Expr::Negate(_)) {
            lhs = format!("({lhs})");
        }
        let rhs = self.expr(right)?;

        if spaced {
            Ok(format!("{lhs} {symbol} {rhs}"))
        } else {
            Ok(format!("{lhs}{symbol}{rhs}"))
        }
    }

    fn if_chain(
        &self,
        branches: &[(Expr, Expr)],
        otherwise: Option<&Expr>,
    ) -> Result<String, TranslateError> {
        let mut tail = otherwise.map(|o| self.expr(o)).transpose()?;
        for (condition, result) in branches.iter().rev() {
            let condition = self.expr(condition)?;
            let result = self.expr(result)?;
            tail = Some(match tail {
                Some(rest) => format!("IF({condition}, {result}, {rest})"),
                None => format!("IF({condition}, {result})"),
            });
        }
        tail.ok_or_else(|| TranslateError::syntax("IF without branches", 0))
    }

    fn args(&self, args: &[Expr]) -> Result<Vec<String>, TranslateError> {
        args.iter().map(|a| self.expr(a)).collect()
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<String, TranslateError> {
        if is_table_calculation(name) {
            return Err(TranslateError::Unsupported(format!(
                "table calculation {name} has no measure equivalent"
            )));
        }
        if let Some(reason) = refusal(name) {
            return Err(TranslateError::Unsupported(format!("{name}: {reason}")));
        }

        if let Some(aggregate) = find_aggregate(name) {
            // MIN(a, b) and MAX(a, b) compare two values
            if args.len() == 2 && find_rename(name).is_some() {
                return self.renamed(name, args);
            }
            check_arity(name, args, 1, 1)?;
            return self.aggregate(aggregate, &args[0]);
        }

        match name {
            "ZN" => {
                check_arity(name, args, 1, 1)?;
                Ok(format!("COALESCE({}, 0)", self.expr(&args[0])?))
            }
            "ROUND" | "LOG" => {
                check_arity(name, args, 1, 2)?;
                let default = if name == "ROUND" { "0" } else { "10" };
                let second = match args.get(1) {
                    Some(arg) => self.expr(arg)?,
                    None => default.to_string(),
                };
                Ok(format!("{name}({}, {second})", self.expr(&args[0])?))
            }
            "CEILING" | "FLOOR" => {
                check_arity(name, args, 1, 1)?;
                Ok(format!("{name}({}, 1)", self.expr(&args[0])?))
            }
            "MID" => {
                check_arity(name, args, 2, 3)?;
                let text = self.expr(&args[0])?;
                let start = self.expr(&args[1])?;
                let length = match args.get(2) {
                    Some(arg) => self.expr(arg)?,
                    None => format!("LEN({text})"),
                };
                Ok(format!("MID({text}, {start}, {length})"))
            }
            "FIND" => {
                check_arity(name, args, 2, 3)?;
                let within = self.expr(&args[0])?;
                let find = self.expr(&args[1])?;
                let start = match args.get(2) {
                    Some(arg) => self.expr(arg)?,
                    None => "1".to_string(),
                };
                Ok(format!("FIND({find}, {within}, {start}, 0)"))
            }
            "STARTSWITH" | "ENDSWITH" => {
                check_arity(name, args, 2, 2)?;
                let text = self.expr(&args[0])?;
                let affix = self.expr(&args[1])?;
                let side = if name == "STARTSWITH" { "LEFT" } else { "RIGHT" };
                Ok(format!("({side}({text}, LEN({affix})) = {affix})"))
            }
            "STR" => {
                check_arity(name, args, 1, 1)?;
                Ok(format!("CONVERT({}, STRING)", self.expr(&args[0])?))
            }
            "FLOAT" => {
                check_arity(name, args, 1, 1)?;
                Ok(format!("CONVERT({}, DOUBLE)", self.expr(&args[0])?))
            }
            "DATEDIFF" => self.datediff(args),
            "DATEPART" => {
                check_arity(name, args, 2, 2)?;
                let part = date_part(name, &args[0])?;
                Ok(format!("{}({})", part.extractor(), self.expr(&args[1])?))
            }
            "DATEADD" => self.dateadd(args),
            _ => self.renamed(name, args),
        }
    }

    fn renamed(&self, name: &str, args: &[Expr]) -> Result<String, TranslateError> {
        let rule = find_rename(name).ok_or_else(|| {
            TranslateError::Unsupported(format!("no DAX mapping for function {name}"))
        })?;
        check_arity(name, args, rule.min_args, rule.max_args)?;
        Ok(format!("{}({})", rule.target, self.args(args)?.join(", ")))
    }

    /// `SUM([Sales])` keeps the column form. A row-level expression over the
    /// columns of one table becomes the iterator form:
    /// `SUM([Price] * [Qty])` → `SUMX('Orders', 'Orders'[Price] * 'Orders'[Qty])`.
    fn aggregate(&self, aggregate: &Aggregate, arg: &Expr) -> Result<String, TranslateError> {
        let name = aggregate.source;
        let arg = arg.ungrouped();

        if let Expr::Field(field) = arg {
            let resolved = self.resolver.resolve(self.datasource, field)?;
            if let Resolved::Measure { measure, .. } = resolved {
                return Err(TranslateError::Unsupported(format!(
                    "{name} over calculation [{measure}] needs a column"
                )));
            }
            return Ok(format!("{}({})", aggregate.column_form, self.field(field)?));
        }

        let Some(iterator) = aggregate.iterator_form else {
            return Err(TranslateError::Unsupported(format!(
                "{name} over an expression has no DAX equivalent"
            )));
        };
        if let Some(nested) = arg.calls().into_iter().find(|call| find_aggregate(call).is_some()) {
            return Err(TranslateError::Unsupported(format!(
                "{name} over an expression containing {nested}"
            )));
        }

        let mut table: Option<String> = None;
        for field in arg.references() {
            match self.resolver.resolve(self.datasource, field)? {
                Resolved::Measure { measure, .. } => {
                    return Err(TranslateError::Unsupported(format!(
                        "{name} over calculation [{measure}] needs a column"
                    )));
                }
                Resolved::Column { table: owner, .. } => match &table {
                    Some(existing) if *existing != owner => {
                        return Err(TranslateError::Unsupported(format!(
                            "{name} over columns of more than one table"
                        )));
                    }
                    Some(_) => {}
                    None => table = Some(owner),
                },
            }
        }
        let table = table.ok_or_else(|| {
            TranslateError::Unsupported(format!("{name} needs at least one column"))
        })?;

        Ok(format!("{iterator}({}, {})", table_name(&table), self.expr(arg)?))
    }

    fn datediff(&self, args: &[Expr]) -> Result<String, TranslateError> {
        if args.len() == 4 {
            return Err(TranslateError::Unsupported(
                "DATEDIFF with a start-of-week argument".to_string(),
            ));
        }
        check_arity("DATEDIFF", args, 3, 3)?;
        let part = date_part("DATEDIFF", &args[0])?;
        let interval = part.interval().ok_or_else(|| {
            TranslateError::Unsupported("DATEDIFF by weekday has no DAX interval".to_string())
        })?;
        Ok(format!(
            "DATEDIFF({}, {}, {interval})",
            self.expr(&args[1])?,
            self.expr(&args[2])?
        ))
    }

    fn dateadd(&self, args: &[Expr]) -> Result<String, TranslateError> {
        check_arity("DATEADD", args, 3, 3)?;
        let part = date_part("DATEADD", &args[0])?;
        let amount = self.expr(&args[1])?;
        let date = self.expr(&args[2])?;
        let scaled = |factor: u32| {
            if is_atomic(&args[1]) {
                format!("{factor} * {amount}")
            } else {
                format!("{factor} * ({amount})")
            }
        };

        match part {
            DatePart::Day => Ok(format!("({date} + {amount})")),
            DatePart::Week => Ok(format!("({date} + {})", scaled(7))),
            DatePart::Month => Ok(format!("EDATE({date}, {amount})")),
            DatePart::Quarter => Ok(format!("EDATE({date}, {})", scaled(3))),
            DatePart::Year => Ok(format!("EDATE({date}, {})", scaled(12))),
            other => Err(TranslateError::Unsupported(format!(
                "DATEADD by {other:?} is not supported"
            ))),
        }
    }

    /// Best-effort text typing, used to turn `+` into `&`
    fn is_text(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Text(_) => true,
            Expr::Field(field) => self
                .resolver
                .resolve(self.datasource, field)
                .ok()
                .and_then(|r| r.datatype().map(|d| d.eq_ignore_ascii_case("string")))
                .unwrap_or(false),
            Expr::Call { name, .. } => TEXT_FUNCTIONS.contains(&name.as_str()),
            Expr::Group(inner) => self.is_text(inner),
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
                ..
            } => self.is_text(left) || self.is_text(right),
            Expr::If {
                branches,
                otherwise,
            } => {
                branches.iter().any(|(_, result)| self.is_text(result))
                    || otherwise.as_deref().is_some_and(|o| self.is_text(o))
            }
            Expr::Case {
                arms, otherwise, ..
            } => {
                arms.iter().any(|(_, result)| self.is_text(result))
                    || otherwise.as_deref().is_some_and(|o| self.is_text(o))
            }
            _ => false,
        }
    }
}

fn check_arity(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), TranslateError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min}-{max}")
    };
    Err(TranslateError::Arity {
        function: name.to_string(),
        expected,
        found: args.len(),
    })
}

/// The date-part argument must be a literal so it can become a DAX keyword
fn date_part(function: &str, arg: &Expr) -> Result<DatePart, TranslateError> {
    match arg {
        Expr::Text(literal) => DatePart::parse(literal).ok_or_else(|| {
            TranslateError::Unsupported(format!("{function} date part '{literal}'"))
        }),
        _ => Err(TranslateError::Unsupported(format!(
            "{function} needs a literal date part"
        ))),
    }
}

fn is_atomic(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Number(_) | Expr::Field(_) | Expr::Call { .. } | Expr::Group(_)
    )
}

fn table_name(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

fn quote_text(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}
