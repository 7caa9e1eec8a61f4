//! Environment markers such as `python_version >= "3.8" and sys_platform == "linux"`.
//!
//! <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use pincer_normalize::ExtraName;
use pincer_pep440::{Operator, Version, VersionSpecifier};

use crate::cursor::Cursor;
use crate::{Pep508Error, Pep508ErrorSource};

/// Marker variables whose value is a PEP 440 version.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueVersion {
    ImplementationVersion,
    PythonFullVersion,
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Marker variables whose value is an arbitrary string.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueString {
    ImplementationName,
    OsName,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    SysPlatform,
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ImplementationName => "implementation_name",
            Self::OsName => "os_name",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::SysPlatform => "sys_platform",
        })
    }
}

/// Either side of a marker comparison.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    MarkerEnvVersion(MarkerValueVersion),
    MarkerEnvString(MarkerValueString),
    /// `extra`, which takes its value from the extras requested of the package being installed.
    Extra,
    QuotedString(String),
}

impl FromStr for MarkerValue {
    type Err = String;

    /// Parses one of the reserved variable names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            "os_name" | "os.name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "platform_machine" | "platform.machine" => {
                Self::MarkerEnvString(MarkerValueString::PlatformMachine)
            }
            "platform_python_implementation" | "platform.python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" | "platform.version" => {
                Self::MarkerEnvString(MarkerValueString::PlatformVersion)
            }
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" | "sys.platform" => {
                Self::MarkerEnvString(MarkerValueString::SysPlatform)
            }
            "extra" => Self::Extra,
            _ => return Err(format!("Invalid key: {s}")),
        };
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerEnvVersion(key) => key.fmt(f),
            Self::MarkerEnvString(key) => key.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::QuotedString(value) => write!(f, "\"{value}\""),
        }
    }
}

/// How to compare the two sides of a marker expression.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    TildeEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    fn to_pep440_operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            Self::In | Self::NotIn => None,
        }
    }

    /// The operator with its operands swapped, for `"3.8" <= python_version`.
    fn reversed(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::GreaterEqual => Self::LessEqual,
            Self::LessThan => Self::GreaterThan,
            Self::LessEqual => Self::GreaterEqual,
            other => other,
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "==" | "===" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "in" => Self::In,
            other => return Err(format!("Invalid comparator: {other}")),
        };
        Ok(value)
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// A version marker value together with the text it was parsed from.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StringVersion {
    pub string: String,
    pub version: Version,
}

impl FromStr for StringVersion {
    type Err = pincer_pep440::VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            string: s.to_string(),
            version: Version::from_str(s)?,
        })
    }
}

impl TryFrom<String> for StringVersion {
    type Error = pincer_pep440::VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<StringVersion> for String {
    fn from(value: StringVersion) -> Self {
        value.string
    }
}

impl Display for StringVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

/// The values of every marker variable for the interpreter being resolved for.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: StringVersion,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: StringVersion,
    pub python_version: StringVersion,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    fn get_version(&self, key: MarkerValueVersion) -> &StringVersion {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version,
            MarkerValueVersion::PythonVersion => &self.python_version,
        }
    }

    fn get_string(&self, key: MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName => &self.os_name,
            MarkerValueString::PlatformMachine => &self.platform_machine,
            MarkerValueString::PlatformPythonImplementation => &self.platform_python_implementation,
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion => &self.platform_version,
            MarkerValueString::SysPlatform => &self.sys_platform,
        }
    }
}

/// A single `<value> <op> <value>` comparison.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerExpression {
    pub l_value: MarkerValue,
    pub operator: MarkerOperator,
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match (&self.l_value, &self.r_value) {
            (MarkerValue::MarkerEnvVersion(key), MarkerValue::QuotedString(r_string)) => {
                let l_version = env.get_version(*key);
                Self::compare_versions(l_version, self.operator, r_string)
                    .unwrap_or_else(|| self.compare_strings(&l_version.string, r_string))
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvVersion(key)) => {
                let r_version = env.get_version(*key);
                match self.operator {
                    MarkerOperator::In | MarkerOperator::NotIn => {
                        self.compare_strings(l_string, &r_version.string)
                    }
                    operator => Self::compare_versions(r_version, operator.reversed(), l_string)
                        .unwrap_or_else(|| self.compare_strings(l_string, &r_version.string)),
                }
            }
            (MarkerValue::MarkerEnvString(key), MarkerValue::QuotedString(r_string)) => {
                self.compare_strings(env.get_string(*key), r_string)
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvString(key)) => {
                self.compare_strings(l_string, env.get_string(*key))
            }
            (MarkerValue::Extra, MarkerValue::QuotedString(value))
            | (MarkerValue::QuotedString(value), MarkerValue::Extra) => {
                let Ok(extra) = ExtraName::from_str(value) else {
                    warn!("Expected extra name, found `{value}`, evaluating `{self}` to false");
                    return false;
                };
                match self.operator {
                    MarkerOperator::Equal => extras.contains(&extra),
                    MarkerOperator::NotEqual => !extras.contains(&extra),
                    _ => {
                        warn!("Comparing `extra` with `{}` is not supported, evaluating `{self}` to false", self.operator);
                        false
                    }
                }
            }
            _ => {
                warn!("Marker `{self}` compares two variables or two strings, evaluating to false");
                false
            }
        }
    }

    /// Compare an environment version with a quoted version, or `None` if the quoted side isn't a
    /// valid version for the operator.
    fn compare_versions(
        env_version: &StringVersion,
        operator: MarkerOperator,
        quoted: &str,
    ) -> Option<bool> {
        let operator = operator.to_pep440_operator()?;
        let (version, star) = Version::from_str_star(quoted).ok()?;
        let specifier = VersionSpecifier::new(operator, version, star).ok()?;
        Some(specifier.contains(&env_version.version))
    }

    fn compare_strings(&self, l_string: &str, r_string: &str) -> bool {
        match self.operator {
            MarkerOperator::Equal => l_string == r_string,
            MarkerOperator::NotEqual => l_string != r_string,
            MarkerOperator::GreaterThan => l_string > r_string,
            MarkerOperator::GreaterEqual => l_string >= r_string,
            MarkerOperator::LessThan => l_string < r_string,
            MarkerOperator::LessEqual => l_string <= r_string,
            MarkerOperator::TildeEqual => {
                warn!("Can't compare `{l_string}` and `{r_string}` with `~=`, evaluating to false");
                false
            }
            MarkerOperator::In => r_string.contains(l_string),
            MarkerOperator::NotIn => !r_string.contains(l_string),
        }
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.l_value, self.operator, self.r_value)
    }
}

/// A tree of marker expressions joined with `and` and `or`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        let mut cursor = Cursor::new(markers);
        parse_markers_cursor(&mut cursor)
    }
}

impl MarkerTree {
    /// Whether the marker holds in `env` when the package is installed with `extras`.
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Expression(expression) => expression.evaluate(env, extras),
            Self::And(trees) => trees.iter().all(|tree| tree.evaluate(env, extras)),
            Self::Or(trees) => trees.iter().any(|tree| tree.evaluate(env, extras)),
        }
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (trees, separator) = match self {
            Self::Expression(expression) => return expression.fmt(f),
            Self::And(trees) => (trees, " and "),
            Self::Or(trees) => (trees, " or "),
        };
        for (index, tree) in trees.iter().enumerate() {
            if index > 0 {
                f.write_str(separator)?;
            }
            if matches!(tree, Self::Expression(_)) {
                write!(f, "{tree}")?;
            } else {
                write!(f, "({tree})")?;
            }
        }
        Ok(())
    }
}

/// ```text
/// marker_op = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    let (start, len) = if cursor.peek_char().is_some_and(char::is_alphabetic) {
        cursor.take_while(char::is_alphabetic)
    } else {
        cursor.take_while(|char| matches!(char, '<' | '=' | '>' | '~' | '!'))
    };
    let operator = cursor.slice(start, len);
    if operator == "not" {
        match cursor.next() {
            Some((_, whitespace)) if whitespace.is_whitespace() => {}
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected whitespace after 'not', found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Expected whitespace after 'not', found end of input".to_string(),
                    ),
                    start: cursor.pos(),
                    len: 1,
                    input: cursor.to_string(),
                });
            }
        }
        cursor.eat_whitespace();
        cursor.next_expect_char('i', cursor.pos())?;
        cursor.next_expect_char('n', cursor.pos())?;
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| Pep508Error {
        message: Pep508ErrorSource::String(format!(
            "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
        )),
        start,
        len: len.max(1),
        input: cursor.to_string(),
    })
}

/// A quoted string or one of the marker variable names.
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    match cursor.peek() {
        None => Err(Pep508Error {
            message: Pep508ErrorSource::String(
                "Expected marker value, found end of dependency specification".to_string(),
            ),
            start: cursor.pos(),
            len: 1,
            input: cursor.to_string(),
        }),
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quotation_mark);
            let value = cursor.slice(start, len).to_string();
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::QuotedString(value))
        }
        Some(_) => {
            let (start, len) = cursor.take_while(|char| {
                !char.is_whitespace() && !matches!(char, '>' | '=' | '<' | '!' | '~' | ')')
            });
            let key = cursor.slice(start, len);
            MarkerValue::from_str(key).map_err(|_| Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected a valid marker name, found '{key}'"
                )),
                start,
                len: len.max(1),
                input: cursor.to_string(),
            })
        }
    }
}

fn parse_marker_key_op_value(cursor: &mut Cursor) -> Result<MarkerExpression, Pep508Error> {
    cursor.eat_whitespace();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;
    Ok(MarkerExpression {
        l_value,
        operator,
        r_value,
    })
}

/// ```text
/// marker_expr = marker_var marker_op marker_var | wsp* '(' marker wsp* ')'
/// ```
fn parse_marker_expr(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor)?;
        cursor.eat_whitespace();
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(cursor)?))
    }
}

fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "and", MarkerTree::And, parse_marker_expr)
}

fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses a run of `parse_inner` separated by `op`, flattening single elements.
fn parse_marker_op(
    cursor: &mut Cursor,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor) -> Result<MarkerTree, Pep508Error>,
) -> Result<MarkerTree, Pep508Error> {
    let mut expressions = vec![parse_inner(cursor)?];
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.peek_while(|c| !c.is_whitespace() && c != '(');
        if cursor.slice(start, len) == op {
            cursor.take_while(|c| !c.is_whitespace() && c != '(');
            expressions.push(parse_inner(cursor)?);
        } else if expressions.len() == 1 {
            return Ok(expressions.remove(0));
        } else {
            return Ok(op_constructor(expressions));
        }
    }
}

/// ```text
/// marker = marker_or
/// ```
pub(crate) fn parse_markers_cursor(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let marker = parse_marker_or(cursor)?;
    cursor.eat_whitespace();
    if let Some((pos, unexpected)) = cursor.next() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Unexpected character '{unexpected}', expected 'and', 'or' or end of input"
            )),
            start: pos,
            len: unexpected.len_utf8() + cursor.remaining(),
            input: cursor.to_string(),
        });
    }
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use pincer_normalize::ExtraName;

    use super::{MarkerEnvironment, MarkerTree, StringVersion};

    fn env(python: &str) -> MarkerEnvironment {
        let version = StringVersion::from_str(python).unwrap();
        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: version.clone(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: String::new(),
            platform_system: "Linux".to_string(),
            platform_version: String::new(),
            python_full_version: version.clone(),
            python_version: version,
            sys_platform: "linux".to_string(),
        }
    }

    fn evaluate(marker: &str, python: &str, extras: &[&str]) -> bool {
        let extras: Vec<ExtraName> = extras
            .iter()
            .map(|extra| ExtraName::from_str(extra).unwrap())
            .collect();
        MarkerTree::from_str(marker)
            .unwrap()
            .evaluate(&env(python), &extras)
    }

    #[test]
    fn equivalence() {
        let values = [
            (r#"python_version == '2.7'"#, r#"python_version == "2.7""#),
            (r#"(python_version == "2.7")"#, r#"python_version == "2.7""#),
            (
                r#"(python_version == "2.7" and sys_platform == "win32")"#,
                r#"python_version == "2.7" and sys_platform == "win32""#,
            ),
            (r#"sys.platform == "win32""#, r#"sys_platform == "win32""#),
        ];
        for (a, b) in values {
            assert_eq!(
                MarkerTree::from_str(a).unwrap(),
                MarkerTree::from_str(b).unwrap(),
                "{a} {b}"
            );
        }
    }

    #[test]
    fn versions() {
        assert!(evaluate(r#"python_version >= "3.8""#, "3.12", &[]));
        assert!(!evaluate(r#"python_version < "3.8""#, "3.12", &[]));
        assert!(evaluate(r#"python_version == "3.*""#, "3.12", &[]));
        assert!(evaluate(r#""3.8" <= python_version"#, "3.12", &[]));
        assert!(!evaluate(r#""3.13" <= python_version"#, "3.12", &[]));
        assert!(evaluate(r#"python_version in "3.11 3.12""#, "3.12", &[]));
    }

    #[test]
    fn strings_and_extras() {
        assert!(evaluate(r#"sys_platform == "linux""#, "3.12", &[]));
        assert!(evaluate(r#"sys_platform != "win32" and os_name == "posix""#, "3.12", &[]));
        assert!(evaluate(r#""linux" in sys_platform or platform_system == "Windows""#, "3.12", &[]));
        assert!(evaluate(r#"platform_system not in "Windows Darwin""#, "3.12", &[]));
        assert!(!evaluate(r#"extra == "security""#, "3.12", &[]));
        assert!(evaluate(r#"extra == "Security""#, "3.12", &["security"]));
        assert!(evaluate(
            r#"python_version >= "3" and (extra == "tests" or extra == "docs")"#,
            "3.12",
            &["docs"]
        ));
    }

    #[test]
    fn display() {
        let marker = MarkerTree::from_str(
            r#"python_version == '2.7' and (sys_platform == "win32" or extra=='docs')"#,
        )
        .unwrap();
        assert_eq!(
            marker.to_string(),
            r#"python_version == "2.7" and (sys_platform == "win32" or extra == "docs")"#
        );
    }

    #[test]
    fn errors() {
        let err = MarkerTree::from_str(r#"python_version >= "3.8" xor sys_platform == "linux""#)
            .unwrap_err();
        insta::assert_snapshot!(err, @r#"
        Unexpected character 'x', expected 'and', 'or' or end of input
        python_version >= "3.8" xor sys_platform == "linux"
                                ^^^^^^^^^^^^^^^^^^^^^^^^^^^
        "#);

        let err = MarkerTree::from_str("python_version >= '3.8").unwrap_err();
        assert_eq!(
            err.to_string(),
            indoc! {"
                Expected ''', found end of dependency specification
                python_version >= '3.8
                                  ^"
            }
        );

        let err = MarkerTree::from_str("python_versio >= '3.8'").unwrap_err();
        assert!(err.to_string().starts_with("Expected a valid marker name, found 'python_versio'"));
    }
}
