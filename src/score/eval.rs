//! Evaluating a parsed score into samples, tempo and a timeline.

use std::collections::HashMap;

use super::lexer::Pos;
use super::parser::{BinaryOp, Expr, ExprKind, Program, Statement};
use super::Score;
use crate::composition::{Layer, Section, Timeline};
use crate::effects::{Effect, ParamValue, Signal, Waveform};
use crate::error::{PatternError, ScoreError};

/// Runtime value of a score expression
#[derive(Debug, Clone)]
enum Value {
    Number(f64),
    Str(String),
    Signal(Signal),
    Layer(Layer),
    Section(Section),
    Timeline(Timeline),
    Object(Vec<(String, Value)>),
    List(Vec<Value>),
    Unit,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Signal(_) => "signal",
            Value::Layer(_) => "pattern",
            Value::Section(_) => "stack",
            Value::Timeline(_) => "cat",
            Value::Object(_) => "object",
            Value::List(_) => "array",
            Value::Unit => "nothing",
        }
    }

    fn is_playable(&self) -> bool {
        matches!(self, Value::Layer(_) | Value::Section(_) | Value::Timeline(_))
    }
}

fn type_error(pos: Pos, message: impl Into<String>) -> ScoreError {
    ScoreError::Type {
        line: pos.line,
        column: pos.column,
        message: message.into(),
    }
}

fn pattern_error(pos: Pos, pattern: &str, source: PatternError) -> ScoreError {
    ScoreError::Pattern {
        line: pos.line,
        column: pos.column,
        pattern: pattern.to_string(),
        source,
    }
}

#[derive(Default)]
struct Evaluator {
    bindings: HashMap<String, Value>,
    samples: Vec<(String, String)>,
    cps: Option<f64>,
    /// Last bare playable expression
    timeline: Option<Value>,
}

/// Run a parsed program.
pub(super) fn evaluate(program: &Program) -> Result<Score, ScoreError> {
    let mut eval = Evaluator::default();

    for statement in &program.statements {
        match statement {
            Statement::Bind { name, value, .. } => {
                let value = match eval.expr(value)? {
                    Value::Section(section) if section.name().is_none() => {
                        Value::Section(section.named(name.clone()))
                    }
                    other => other,
                };
                eval.bindings.insert(name.clone(), value);
            }
            Statement::Expr(expr) => {
                let value = eval.expr(expr)?;
                if value.is_playable() {
                    eval.timeline = Some(value);
                }
            }
        }
    }

    let timeline = match eval.timeline {
        Some(Value::Layer(layer)) => Timeline::from(Section::from(layer)),
        Some(Value::Section(section)) => Timeline::from(section),
        Some(Value::Timeline(timeline)) => timeline,
        _ => return Err(ScoreError::NoTimeline),
    };

    Ok(Score {
        samples: eval.samples,
        cps: eval.cps,
        timeline,
    })
}

impl Evaluator {
    fn expr(&mut self, expr: &Expr) -> Result<Value, ScoreError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Ident(name) => self.lookup(name, expr.pos),
            ExprKind::Object(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    values.push((key.clone(), self.expr(value)?));
                }
                Ok(Value::Object(values))
            }
            ExprKind::Array(items) => Ok(Value::List(
                items.iter().map(|item| self.expr(item)).collect::<Result<_, _>>()?,
            )),
            ExprKind::Neg(inner) => {
                let n = self.number(inner)?;
                Ok(Value::Number(-n))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let a = self.number(lhs)?;
                let b = self.number(rhs)?;
                let n = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(type_error(rhs.pos, "division by zero"));
                        }
                        a / b
                    }
                };
                Ok(Value::Number(n))
            }
            ExprKind::Member { name, .. } => Err(type_error(
                expr.pos,
                format!("'{}' is a method and has to be called", name),
            )),
            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Ident(name) => self.call(name, args, expr.pos),
                ExprKind::Member { object, name } => {
                    let target = self.expr(object)?;
                    self.method(target, name, args, expr.pos)
                }
                _ => Err(type_error(expr.pos, "this expression cannot be called")),
            },
        }
    }

    fn lookup(&self, name: &str, pos: Pos) -> Result<Value, ScoreError> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        if let Some(shape) = Waveform::from_name(name) {
            return Ok(Value::Signal(Signal::wave(shape)));
        }
        Err(ScoreError::Unknown {
            line: pos.line,
            column: pos.column,
            name: name.to_string(),
        })
    }

    fn number(&mut self, expr: &Expr) -> Result<f64, ScoreError> {
        match self.expr(expr)? {
            Value::Number(n) => Ok(n),
            other => Err(type_error(
                expr.pos,
                format!("expected a number, found {}", other.type_name()),
            )),
        }
    }

    fn string(&mut self, expr: &Expr) -> Result<String, ScoreError> {
        match self.expr(expr)? {
            Value::Str(s) => Ok(s),
            // note(60) and s(1) read like their string forms
            Value::Number(n) => Ok(n.to_string()),
            other => Err(type_error(
                expr.pos,
                format!("expected a string, found {}", other.type_name()),
            )),
        }
    }

    fn param(&mut self, expr: &Expr) -> Result<ParamValue, ScoreError> {
        match self.expr(expr)? {
            Value::Number(n) => Ok(ParamValue::from(n)),
            Value::Signal(signal) => Ok(ParamValue::from(signal)),
            other => Err(type_error(
                expr.pos,
                format!("expected a number or signal, found {}", other.type_name()),
            )),
        }
    }

    fn positive(&mut self, expr: &Expr) -> Result<f64, ScoreError> {
        let n = self.number(expr)?;
        if n.is_finite() && n > 0.0 {
            Ok(n)
        } else {
            let message = format!("expected a positive number, found {}", n);
            Err(type_error(expr.pos, message))
        }
    }

    fn arity<'e>(
        args: &'e [Expr],
        n: usize,
        what: &str,
        pos: Pos,
    ) -> Result<&'e [Expr], ScoreError> {
        if args.len() == n {
            return Ok(args);
        }
        let plural = if n == 1 { "" } else { "s" };
        Err(type_error(
            pos,
            format!("{}() takes {} argument{}, got {}", what, n, plural, args.len()),
        ))
    }

    fn call(&mut self, name: &str, args: &[Expr], pos: Pos) -> Result<Value, ScoreError> {
        match name {
            "samples" => {
                self.samples_call(args, pos)?;
                Ok(Value::Unit)
            }
            "setcps" | "setcpm" => {
                let args = Self::arity(args, 1, name, pos)?;
                let mut cps = self.positive(&args[0])?;
                if name == "setcpm" {
                    cps /= 60.0;
                }
                self.cps = Some(cps);
                Ok(Value::Unit)
            }
            "s" | "sound" | "note" => {
                let args = Self::arity(args, 1, name, pos)?;
                let source = self.string(&args[0])?;
                let layer = if name == "note" {
                    Layer::note(&source)
                } else {
                    Layer::sound(&source)
                };
                layer
                    .map(Value::Layer)
                    .map_err(|e| pattern_error(args[0].pos, &source, e))
            }
            "stack" => {
                let mut layers = Vec::new();
                let mut cycles = 1;
                for arg in args {
                    match self.expr(arg)? {
                        Value::Layer(layer) => layers.push(layer),
                        Value::Section(section) => {
                            cycles = cycles.max(section.cycles());
                            layers.extend(section.layers().iter().cloned());
                        }
                        other => {
                            return Err(type_error(
                                arg.pos,
                                format!("stack() takes patterns, found {}", other.type_name()),
                            ))
                        }
                    }
                }
                Ok(Value::Section(Section::stack(layers).with_cycles(cycles)))
            }
            "cat" => {
                if args.is_empty() {
                    return Err(type_error(pos, "cat() needs at least one section"));
                }
                let mut timeline = Timeline::default();
                for arg in args {
                    timeline = match self.expr(arg)? {
                        Value::Layer(layer) => timeline.then(Section::from(layer)),
                        Value::Section(section) => timeline.then(section),
                        Value::Timeline(other) => timeline.concat(other),
                        other => {
                            let message = format!(
                                "cat() takes patterns or stacks, found {}",
                                other.type_name()
                            );
                            return Err(type_error(arg.pos, message));
                        }
                    };
                }
                Ok(Value::Timeline(timeline))
            }
            "line" => {
                let args = Self::arity(args, 2, name, pos)?;
                let from = self.number(&args[0])?;
                let to = self.number(&args[1])?;
                Ok(Value::Signal(Signal::line(from, to)))
            }
            _ => Err(ScoreError::Unknown {
                line: pos.line,
                column: pos.column,
                name: name.to_string(),
            }),
        }
    }

    /// `samples({ name: 'uri', ... }, 'base/')`
    ///
    /// A name bound to an array registers `name` for the first entry and
    /// `name:i` for each entry.
    fn samples_call(&mut self, args: &[Expr], pos: Pos) -> Result<(), ScoreError> {
        let (map, base) = match args {
            [map] => (map, None),
            [map, base] => (map, Some(self.string(base)?)),
            _ => return Err(type_error(pos, "samples() takes a map and an optional base URL")),
        };
        let Value::Object(entries) = self.expr(map)? else {
            return Err(type_error(map.pos, "samples() expects { name: 'uri', ... }"));
        };

        let join = |uri: String| match &base {
            Some(base) if !uri.contains("://") && !uri.starts_with('/') => {
                format!("{}{}", base, uri)
            }
            _ => uri,
        };

        for (name, value) in entries {
            match value {
                Value::Str(uri) => self.samples.push((name, join(uri))),
                Value::List(items) => {
                    for (i, item) in items.into_iter().enumerate() {
                        let Value::Str(uri) = item else {
                            let message = format!("sample '{}' has a non-string entry", name);
                            return Err(type_error(map.pos, message));
                        };
                        let uri = join(uri);
                        if i == 0 {
                            self.samples.push((name.clone(), uri.clone()));
                        }
                        self.samples.push((format!("{}:{}", name, i), uri));
                    }
                }
                other => {
                    let message = format!(
                        "sample '{}' must be a URI string, found {}",
                        name,
                        other.type_name()
                    );
                    return Err(type_error(map.pos, message));
                }
            }
        }
        Ok(())
    }

    fn method(
        &mut self,
        target: Value,
        name: &str,
        args: &[Expr],
        pos: Pos,
    ) -> Result<Value, ScoreError> {
        match target {
            Value::Signal(signal) => self.signal_method(signal, name, args, pos),
            Value::Layer(layer) => {
                if matches!(name, "s" | "sound") {
                    let args = Self::arity(args, 1, name, pos)?;
                    return Ok(Value::Layer(layer.s(self.string(&args[0])?)));
                }
                let effect = self.effect(name, args, pos, "pattern")?;
                Ok(Value::Layer(layer.with(effect)))
            }
            Value::Section(section) => {
                let effect = self.effect(name, args, pos, "stack")?;
                Ok(Value::Section(section.with(effect)))
            }
            Value::Timeline(timeline) => {
                let effect = self.effect(name, args, pos, "cat")?;
                Ok(Value::Timeline(Timeline::cat(
                    timeline
                        .sections()
                        .map(|(_, section)| section.clone().with(effect.clone())),
                )))
            }
            other => Err(type_error(
                pos,
                format!("{} has no method '{}'", other.type_name(), name),
            )),
        }
    }

    fn effect(
        &mut self,
        name: &str,
        args: &[Expr],
        pos: Pos,
        on: &str,
    ) -> Result<Effect, ScoreError> {
        let args = Self::arity(args, 1, name, pos)?;
        let value = self.param(&args[0])?;
        Effect::from_name(name, value)
            .ok_or_else(|| type_error(pos, format!("{} has no method '{}'", on, name)))
    }

    fn signal_method(
        &mut self,
        signal: Signal,
        name: &str,
        args: &[Expr],
        pos: Pos,
    ) -> Result<Value, ScoreError> {
        let signal = match name {
            "slow" => {
                let args = Self::arity(args, 1, name, pos)?;
                signal.slow(self.positive(&args[0])?)
            }
            "fast" => {
                let args = Self::arity(args, 1, name, pos)?;
                signal.fast(self.positive(&args[0])?)
            }
            "range" => {
                let args = Self::arity(args, 2, name, pos)?;
                let lo = self.number(&args[0])?;
                let hi = self.number(&args[1])?;
                signal.range(lo, hi)
            }
            _ => return Err(type_error(pos, format!("signal has no method '{}'", name))),
        };
        Ok(Value::Signal(signal))
    }
}
