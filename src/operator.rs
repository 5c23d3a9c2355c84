//! Comparison operators as self-describing descriptors.
//!
//! Each operator carries its own per-syntax rendering rules, so translators
//! never branch on which operator they are looking at. A new operator is a
//! new `static Operator`; registering it in an [`OperatorRegistry`] makes it
//! reachable by name.

use std::{cmp::Ordering, fmt};

use once_cell::sync::Lazy;

use crate::{
    error::{Error, Result},
    evaluate::{compare, text_of},
    translate::odata::literal,
    value::Value,
};

/// Selects which rendering of an operator a translator wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Sql,
    OData,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Sql => write!(f, "SQL"),
            Syntax::OData => write!(f, "OData"),
        }
    }
}

/// Builds condition text from the rendered property reference and operands
///  (placeholders or literals, one per value).
pub type Template = fn(&str, &[String]) -> String;

/// In-memory semantics: `(field value, condition value)`.
pub type Predicate = fn(&Value, Option<&Value>) -> bool;

/// How a condition's value reaches the backend.
#[derive(Clone, Copy)]
pub enum ValueFormat {
    /// The operator takes no operand.
    None,
    /// Bound as a parameter; the function yields the value actually bound.
    Bind(fn(&Value) -> Result<Value>),
    /// Inlined as escaped literal text.
    Literal(fn(&Value) -> Result<String>),
}

#[derive(Clone, Copy)]
pub struct Rendering {
    pub syntax: Syntax,
    pub template: Template,
    pub value: ValueFormat,
}

pub struct Operator {
    pub name: &'static str,
    pub requires_value: bool,
    /// The value must be a non-empty list; each element becomes its own operand.
    pub expects_list: bool,
    pub renderings: &'static [Rendering],
    pub evaluate: Option<Predicate>,
}

impl Operator {
    pub fn rendering(&self, syntax: Syntax) -> Result<&Rendering> {
        self.renderings
            .iter()
            .find(|r| r.syntax == syntax)
            .ok_or_else(|| Error::UnsupportedOperator {
                operator: self.name.to_string(),
                syntax: syntax.to_string(),
            })
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("requires_value", &self.requires_value)
            .field("expects_list", &self.expects_list)
            .finish()
    }
}

// Operators are identified by name; two descriptors with one name would be
//  ambiguous in the registry anyway.
impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

fn first(operands: &[String]) -> &str {
    operands.first().map_or("", String::as_str)
}

fn bind_as_is(v: &Value) -> Result<Value> {
    Ok(v.clone())
}

const LIKE_ESCAPE: char = '!';

// `[` opens a character class on SQL Server; escaping it is harmless elsewhere

fn escape_like(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '[' | LIKE_ESCAPE) {
            res.push(LIKE_ESCAPE);
        }
        res.push(c);
    }
    res
}

fn like_pattern(v: &Value, prefix: &str, suffix: &str) -> Result<Value> {
    match v {
        Value::Text(s) => Ok(Value::Text(format!("{prefix}{}{suffix}", escape_like(s)))),
        other => Err(Error::malformed(format!(
            "pattern operators need a text value, got {}",
            other.type_name()
        ))),
    }
}

macro_rules! ordering_op {
    ($ident:ident, $name:literal, $sql:literal, $odata:literal, $($ord:pat_param)|+) => {
        pub static $ident: Operator = Operator {
            name: $name,
            requires_value: true,
            expects_list: false,
            renderings: &[
                Rendering {
                    syntax: Syntax::Sql,
                    template: |p, o| format!(concat!("{} ", $sql, " {}"), p, first(o)),
                    value: ValueFormat::Bind(bind_as_is),
                },
                Rendering {
                    syntax: Syntax::OData,
                    template: |p, o| format!(concat!("{} ", $odata, " {}"), p, first(o)),
                    value: ValueFormat::Literal(literal),
                },
            ],
            evaluate: Some(|l, r| {
                r.and_then(|r| compare(l, r))
                    .is_some_and(|ord| matches!(ord, $($ord)|+))
            }),
        };
    };
}

ordering_op!(EQUAL, "Equal", "=", "eq", Ordering::Equal);
ordering_op!(GREATER_THAN, "GreaterThan", ">", "gt", Ordering::Greater);
ordering_op!(
    GREATER_THAN_OR_EQUAL,
    "GreaterThanOrEqual",
    ">=",
    "ge",
    Ordering::Greater | Ordering::Equal
);
ordering_op!(LESS_THAN, "LessThan", "<", "lt", Ordering::Less);
ordering_op!(
    LESS_THAN_OR_EQUAL,
    "LessThanOrEqual",
    "<=",
    "le",
    Ordering::Less | Ordering::Equal
);

pub static NOT_EQUAL: Operator = Operator {
    name: "NotEqual",
    requires_value: true,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, o| format!("{p} <> {}", first(o)),
            value: ValueFormat::Bind(bind_as_is),
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, o| format!("{p} ne {}", first(o)),
            value: ValueFormat::Literal(literal),
        },
    ],
    // Null is unequal to everything, including a non-null probe
    evaluate: Some(|l, r| match r {
        Some(r) if !l.is_null() => compare(l, r) != Some(Ordering::Equal),
        _ => false,
    }),
};

pub static CONTAINS: Operator = Operator {
    name: "Contains",
    requires_value: true,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, o| format!("{p} LIKE {} ESCAPE '!'", first(o)),
            value: ValueFormat::Bind(|v| like_pattern(v, "%", "%")),
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, o| format!("contains({p},{})", first(o)),
            value: ValueFormat::Literal(literal),
        },
    ],
    evaluate: Some(|l, r| match (text_of(l), r.and_then(text_of)) {
        (Some(l), Some(r)) => l.contains(r),
        _ => false,
    }),
};

pub static STARTS_WITH: Operator = Operator {
    name: "StartsWith",
    requires_value: true,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, o| format!("{p} LIKE {} ESCAPE '!'", first(o)),
            value: ValueFormat::Bind(|v| like_pattern(v, "", "%")),
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, o| format!("startswith({p},{})", first(o)),
            value: ValueFormat::Literal(literal),
        },
    ],
    evaluate: Some(|l, r| match (text_of(l), r.and_then(text_of)) {
        (Some(l), Some(r)) => l.starts_with(r),
        _ => false,
    }),
};

pub static ENDS_WITH: Operator = Operator {
    name: "EndsWith",
    requires_value: true,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, o| format!("{p} LIKE {} ESCAPE '!'", first(o)),
            value: ValueFormat::Bind(|v| like_pattern(v, "%", "")),
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, o| format!("endswith({p},{})", first(o)),
            value: ValueFormat::Literal(literal),
        },
    ],
    evaluate: Some(|l, r| match (text_of(l), r.and_then(text_of)) {
        (Some(l), Some(r)) => l.ends_with(r),
        _ => false,
    }),
};

pub static IN: Operator = Operator {
    name: "In",
    requires_value: true,
    expects_list: true,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, o| format!("{p} IN ({})", o.join(", ")),
            value: ValueFormat::Bind(bind_as_is),
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, o| format!("{p} in ({})", o.join(",")),
            value: ValueFormat::Literal(literal),
        },
    ],
    evaluate: Some(|l, r| {
        r.and_then(Value::as_list).is_some_and(|items| {
            items
                .iter()
                .any(|item| compare(l, item) == Some(Ordering::Equal))
        })
    }),
};

pub static IS_NULL: Operator = Operator {
    name: "IsNull",
    requires_value: false,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, _| format!("{p} IS NULL"),
            value: ValueFormat::None,
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, _| format!("{p} eq null"),
            value: ValueFormat::None,
        },
    ],
    evaluate: Some(|l, _| l.is_null()),
};

pub static IS_NOT_NULL: Operator = Operator {
    name: "IsNotNull",
    requires_value: false,
    expects_list: false,
    renderings: &[
        Rendering {
            syntax: Syntax::Sql,
            template: |p, _| format!("{p} IS NOT NULL"),
            value: ValueFormat::None,
        },
        Rendering {
            syntax: Syntax::OData,
            template: |p, _| format!("{p} ne null"),
            value: ValueFormat::None,
        },
    ],
    evaluate: Some(|l, _| !l.is_null()),
};

/// Name → descriptor lookup. Names match case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct OperatorRegistry {
    operators: Vec<&'static Operator>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The twelve built-in comparison operators.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for op in [
            &EQUAL,
            &NOT_EQUAL,
            &GREATER_THAN,
            &GREATER_THAN_OR_EQUAL,
            &LESS_THAN,
            &LESS_THAN_OR_EQUAL,
            &CONTAINS,
            &STARTS_WITH,
            &ENDS_WITH,
            &IN,
            &IS_NULL,
            &IS_NOT_NULL,
        ] {
            registry.register(op);
        }
        registry
    }

    /// Adds an operator, replacing any previous entry with the same name.
    pub fn register(&mut self, op: &'static Operator) {
        match self
            .operators
            .iter_mut()
            .find(|o| o.name.eq_ignore_ascii_case(op.name))
        {
            Some(slot) => *slot = op,
            None => self.operators.push(op),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static Operator> {
        self.operators
            .iter()
            .copied()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operators.iter().map(|o| o.name).collect()
    }
}

pub static STANDARD_OPERATORS: Lazy<OperatorRegistry> = Lazy::new(OperatorRegistry::standard);
