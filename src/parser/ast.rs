//! Abstract Syntax Tree types for Jinja-style templates

use std::fmt;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Root AST node - a complete template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub body: Vec<Spanned<Stmt>>,
}

/// Whether a name is read or bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctx {
    Load,
    Store,
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Str(s) => write!(f, "{:?}", s),
            Const::Int(n) => write!(f, "{}", n),
            Const::Float(n) => write!(f, "{:?}", n),
            Const::Bool(true) => write!(f, "true"),
            Const::Bool(false) => write!(f, "false"),
            Const::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

/// One `op operand` step of a comparison chain
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub op: CmpOp,
    pub expr: Spanned<Expr>,
}

/// Key/value pair of a dict literal
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub key: Spanned<Expr>,
    pub value: Spanned<Expr>,
}

/// `name=value` argument of a call, filter or test
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub key: String,
    pub value: Spanned<Expr>,
}

/// Positional, keyword and unpacked arguments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args {
    pub args: Vec<Spanned<Expr>>,
    pub kwargs: Vec<Keyword>,
    /// `*args`
    pub dyn_args: Option<Box<Spanned<Expr>>>,
    /// `**kwargs`
    pub dyn_kwargs: Option<Box<Spanned<Expr>>>,
}

impl Args {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
            && self.kwargs.is_empty()
            && self.dyn_args.is_none()
            && self.dyn_kwargs.is_none()
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Variable reference: `user`
    Name { name: String, ctx: Ctx },
    /// Attribute access: `user.name`
    Getattr { node: Box<Spanned<Expr>>, attr: String },
    /// Subscript: `user['name']`
    Getitem {
        node: Box<Spanned<Expr>>,
        arg: Box<Spanned<Expr>>,
    },
    /// Slice inside a subscript: `start:stop:step`, each part optional
    Slice {
        start: Option<Box<Spanned<Expr>>>,
        stop: Option<Box<Spanned<Expr>>>,
        step: Option<Box<Spanned<Expr>>>,
    },
    /// Namespace assignment target: `ns.count` in `{% set ns.count = 1 %}`
    NsRef { name: String, attr: String },
    Const(Const),
    /// Raw text between tags
    TemplateData(String),
    Tuple { items: Vec<Spanned<Expr>>, ctx: Ctx },
    List(Vec<Spanned<Expr>>),
    Dict(Vec<Pair>),
    Compare {
        expr: Box<Spanned<Expr>>,
        ops: Vec<Operand>,
    },
    BinExpr {
        op: BinOp,
        left: Box<Spanned<Expr>>,
        right: Box<Spanned<Expr>>,
    },
    UnaryExpr { op: UnaryOp, node: Box<Spanned<Expr>> },
    /// String concatenation with `~`
    Concat(Vec<Spanned<Expr>>),
    /// Inline conditional: `a if b else c`
    CondExpr {
        test: Box<Spanned<Expr>>,
        expr1: Box<Spanned<Expr>>,
        expr2: Option<Box<Spanned<Expr>>>,
    },
    Filter {
        node: Box<Spanned<Expr>>,
        name: String,
        args: Args,
    },
    Test {
        node: Box<Spanned<Expr>>,
        name: String,
        args: Args,
        negated: bool,
    },
    Call { node: Box<Spanned<Expr>>, args: Args },
}

impl Expr {
    /// Node kind, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Name { .. } => "Name",
            Expr::Getattr { .. } => "Getattr",
            Expr::Getitem { .. } => "Getitem",
            Expr::Slice { .. } => "Slice",
            Expr::NsRef { .. } => "NSRef",
            Expr::Const(_) => "Const",
            Expr::TemplateData(_) => "TemplateData",
            Expr::Tuple { .. } => "Tuple",
            Expr::List(_) => "List",
            Expr::Dict(_) => "Dict",
            Expr::Compare { .. } => "Compare",
            Expr::BinExpr { .. } => "BinExpr",
            Expr::UnaryExpr { .. } => "UnaryExpr",
            Expr::Concat(_) => "Concat",
            Expr::CondExpr { .. } => "CondExpr",
            Expr::Filter { .. } => "Filter",
            Expr::Test { .. } => "Test",
            Expr::Call { .. } => "Call",
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name {
            name: name.into(),
            ctx: Ctx::Load,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Spanned<Expr>]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item.node)?;
    }
    Ok(())
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.args.iter().map(|a| a.node.to_string()).collect();
        parts.extend(self.kwargs.iter().map(|kw| format!("{}={}", kw.key, kw.value.node)));
        if let Some(star) = &self.dyn_args {
            parts.push(format!("*{}", star.node));
        }
        if let Some(star) = &self.dyn_kwargs {
            parts.push(format!("**{}", star.node));
        }
        write!(f, "({})", parts.join(", "))
    }
}

fn write_opt(f: &mut fmt::Formatter<'_>, part: &Option<Box<Spanned<Expr>>>) -> fmt::Result {
    match part {
        Some(expr) => write!(f, "{}", expr.node),
        None => Ok(()),
    }
}

/// Renders the expression back to template syntax
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name { name, .. } => write!(f, "{}", name),
            Expr::Getattr { node, attr } => write!(f, "{}.{}", node.node, attr),
            Expr::Getitem { node, arg } => write!(f, "{}[{}]", node.node, arg.node),
            Expr::Slice { start, stop, step } => {
                write_opt(f, start)?;
                write!(f, ":")?;
                write_opt(f, stop)?;
                if step.is_some() {
                    write!(f, ":")?;
                    write_opt(f, step)?;
                }
                Ok(())
            }
            Expr::NsRef { name, attr } => write!(f, "{}.{}", name, attr),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::TemplateData(s) => write!(f, "{:?}", s),
            Expr::Tuple { items, .. } => {
                write!(f, "(")?;
                write_list(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            Expr::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key.node, pair.value.node)?;
                }
                write!(f, "}}")
            }
            Expr::Compare { expr, ops } => {
                write!(f, "{}", expr.node)?;
                for operand in ops {
                    write!(f, " {} {}", operand.op.as_str(), operand.expr.node)?;
                }
                Ok(())
            }
            Expr::BinExpr { op, left, right } => {
                write!(f, "{} {} {}", left.node, op.as_str(), right.node)
            }
            Expr::UnaryExpr { op, node } => match op {
                UnaryOp::Not => write!(f, "not {}", node.node),
                UnaryOp::Neg => write!(f, "-{}", node.node),
                UnaryOp::Pos => write!(f, "+{}", node.node),
            },
            Expr::Concat(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ~ ")?;
                    }
                    write!(f, "{}", item.node)?;
                }
                Ok(())
            }
            Expr::CondExpr { test, expr1, expr2 } => {
                write!(f, "{} if {}", expr1.node, test.node)?;
                if let Some(other) = expr2 {
                    write!(f, " else {}", other.node)?;
                }
                Ok(())
            }
            Expr::Filter { node, name, args } => {
                write!(f, "{} | {}", node.node, name)?;
                if !args.is_empty() {
                    write!(f, "{}", args)?;
                }
                Ok(())
            }
            Expr::Test {
                node,
                name,
                args,
                negated,
            } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} is {}{}", node.node, not, name)?;
                if !args.is_empty() {
                    write!(f, "{}", args)?;
                }
                Ok(())
            }
            Expr::Call { node, args } => write!(f, "{}{}", node.node, args),
        }
    }
}

/// One `if`/`elif` arm
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub test: Spanned<Expr>,
    pub body: Vec<Spanned<Stmt>>,
}

/// Macro parameter with optional default
#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<Spanned<Expr>>,
}

/// Name imported by `{% from ... import name as alias %}`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

/// Template-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Run of template data and `{{ ... }}` expressions
    Output(Vec<Spanned<Expr>>),
    /// `{% for target in iter %}...{% else %}...{% endfor %}`
    For {
        target: Spanned<Expr>,
        iter: Spanned<Expr>,
        filter: Option<Spanned<Expr>>,
        recursive: bool,
        body: Vec<Spanned<Stmt>>,
        else_: Vec<Spanned<Stmt>>,
    },
    /// `{% if %}...{% elif %}...{% else %}...{% endif %}`
    If {
        test: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
        elif_: Vec<IfBranch>,
        else_: Vec<Spanned<Stmt>>,
    },
    /// `{% set target = value %}`
    Assign {
        target: Spanned<Expr>,
        node: Spanned<Expr>,
    },
    /// `{% set target %}...{% endset %}`
    AssignBlock {
        target: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    Include {
        template: Spanned<Expr>,
        ignore_missing: bool,
        with_context: bool,
    },
    Extends { template: Spanned<Expr> },
    Import {
        template: Spanned<Expr>,
        target: String,
        with_context: bool,
    },
    FromImport {
        template: Spanned<Expr>,
        names: Vec<ImportName>,
        with_context: bool,
    },
    Macro {
        name: String,
        params: Vec<MacroParam>,
        body: Vec<Spanned<Stmt>>,
    },
    /// `{% call(args) macro(...) %}...{% endcall %}`
    CallBlock {
        call: Spanned<Expr>,
        params: Vec<MacroParam>,
        body: Vec<Spanned<Stmt>>,
    },
    FilterBlock {
        name: String,
        args: Args,
        body: Vec<Spanned<Stmt>>,
    },
    With {
        assignments: Vec<(String, Spanned<Expr>)>,
        body: Vec<Spanned<Stmt>>,
    },
    Block {
        name: String,
        scoped: bool,
        body: Vec<Spanned<Stmt>>,
    },
    /// `{% autoescape true %}...{% endautoescape %}`
    Autoescape {
        enabled: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
}

impl Stmt {
    /// Node kind, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Output(_) => "Output",
            Stmt::For { .. } => "For",
            Stmt::If { .. } => "If",
            Stmt::Assign { .. } => "Assign",
            Stmt::AssignBlock { .. } => "AssignBlock",
            Stmt::Include { .. } => "Include",
            Stmt::Extends { .. } => "Extends",
            Stmt::Import { .. } => "Import",
            Stmt::FromImport { .. } => "FromImport",
            Stmt::Macro { .. } => "Macro",
            Stmt::CallBlock { .. } => "CallBlock",
            Stmt::FilterBlock { .. } => "FilterBlock",
            Stmt::With { .. } => "With",
            Stmt::Block { .. } => "Block",
            Stmt::Autoescape { .. } => "Autoescape",
        }
    }

    /// Short tag-like rendering, used in diagnostics
    pub fn summary(&self) -> String {
        match self {
            Stmt::Output(items) => format!("{} output item(s)", items.len()),
            Stmt::For { target, iter, .. } => {
                format!("for {} in {}", target.node, iter.node)
            }
            Stmt::If { test, .. } => format!("if {}", test.node),
            Stmt::Assign { target, node } => format!("set {} = {}", target.node, node.node),
            Stmt::AssignBlock { target, .. } => format!("set {}", target.node),
            Stmt::Include { template, .. } => format!("include {}", template.node),
            Stmt::Extends { template } => format!("extends {}", template.node),
            Stmt::Import {
                template, target, ..
            } => format!("import {} as {}", template.node, target),
            Stmt::FromImport {
                template, names, ..
            } => {
                let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
                format!("from {} import {}", template.node, names.join(", "))
            }
            Stmt::Macro { name, params, .. } => {
                let params: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                format!("macro {}({})", name, params.join(", "))
            }
            Stmt::CallBlock { call, .. } => format!("call {}", call.node),
            Stmt::FilterBlock { name, .. } => format!("filter {}", name),
            Stmt::With { assignments, .. } => {
                let names: Vec<&str> = assignments.iter().map(|(n, _)| n.as_str()).collect();
                format!("with {}", names.join(", "))
            }
            Stmt::Block { name, .. } => format!("block {}", name),
            Stmt::Autoescape { enabled, .. } => format!("autoescape {}", enabled.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(expr: Expr) -> Spanned<Expr> {
        Spanned::new(expr, 0..1)
    }

    #[test]
    fn test_display_attribute_chain() {
        let expr = Expr::Getattr {
            node: Box::new(sp(Expr::Getattr {
                node: Box::new(sp(Expr::name("a"))),
                attr: "b".to_string(),
            })),
            attr: "c".to_string(),
        };
        assert_eq!(expr.to_string(), "a.b.c");
    }

    #[test]
    fn test_display_filter_with_args() {
        let expr = Expr::Filter {
            node: Box::new(sp(Expr::name("items"))),
            name: "join".to_string(),
            args: Args {
                args: vec![sp(Expr::Const(Const::Str(", ".to_string())))],
                ..Args::default()
            },
        };
        assert_eq!(expr.to_string(), r#"items | join(", ")"#);
    }

    #[test]
    fn test_display_dict_and_tuple() {
        let dict = Expr::Dict(vec![Pair {
            key: sp(Expr::Const(Const::Str("k".to_string()))),
            value: sp(Expr::Const(Const::Int(1))),
        }]);
        assert_eq!(dict.to_string(), r#"{"k": 1}"#);

        let tuple = Expr::Tuple {
            items: vec![sp(Expr::name("x"))],
            ctx: Ctx::Load,
        };
        assert_eq!(tuple.to_string(), "(x,)");
    }

    #[test]
    fn test_display_slice_and_unpacked_args() {
        let slice = Expr::Slice {
            start: Some(Box::new(sp(Expr::Const(Const::Int(1))))),
            stop: None,
            step: Some(Box::new(sp(Expr::Const(Const::Int(2))))),
        };
        assert_eq!(slice.to_string(), "1::2");

        let call = Expr::Call {
            node: Box::new(sp(Expr::name("f"))),
            args: Args {
                args: vec![sp(Expr::name("a"))],
                dyn_args: Some(Box::new(sp(Expr::name("rest")))),
                dyn_kwargs: Some(Box::new(sp(Expr::name("opts")))),
                ..Args::default()
            },
        };
        assert_eq!(call.to_string(), "f(a, *rest, **opts)");
    }

    #[test]
    fn test_stmt_summary() {
        let stmt = Stmt::Macro {
            name: "field".to_string(),
            params: vec![
                MacroParam {
                    name: "name".to_string(),
                    default: None,
                },
                MacroParam {
                    name: "value".to_string(),
                    default: Some(sp(Expr::Const(Const::None))),
                },
            ],
            body: vec![],
        };
        assert_eq!(stmt.summary(), "macro field(name, value)");
        assert_eq!(stmt.kind_name(), "Macro");
    }
}
