//! Builtin functions available to every generated program
//!
//! Console builtins forward to the [`ConsoleSink`]; the rest are small
//! string and number helpers the dialect grammars map their own library
//! calls onto (`UPPER(x)` becomes `upper(x)`, `LEFT$(s, n)` becomes
//! `left(s, n)`, and so on).

use crate::value::Value;
use relic_core::{ConsoleSink, Rgb, palette};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Goto,
    Newline,
    Cls,
    SetColor,
    SetFg,
    SetBg,
    Palette,
    Str,
    Len,
    Upper,
    Lower,
    Substr,
    Left,
    Right,
    Val,
    Int,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "goto" => Builtin::Goto,
            "newline" => Builtin::Newline,
            "cls" => Builtin::Cls,
            "set_color" => Builtin::SetColor,
            "set_fg" => Builtin::SetFg,
            "set_bg" => Builtin::SetBg,
            "palette" => Builtin::Palette,
            "str" => Builtin::Str,
            "len" => Builtin::Len,
            "upper" => Builtin::Upper,
            "lower" => Builtin::Lower,
            "substr" => Builtin::Substr,
            "left" => Builtin::Left,
            "right" => Builtin::Right,
            "val" => Builtin::Val,
            "int" => Builtin::Int,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Goto => "goto",
            Builtin::Newline => "newline",
            Builtin::Cls => "cls",
            Builtin::SetColor => "set_color",
            Builtin::SetFg => "set_fg",
            Builtin::SetBg => "set_bg",
            Builtin::Palette => "palette",
            Builtin::Str => "str",
            Builtin::Len => "len",
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Substr => "substr",
            Builtin::Left => "left",
            Builtin::Right => "right",
            Builtin::Val => "val",
            Builtin::Int => "int",
        }
    }

    pub fn call(self, args: &[Value], console: &mut dyn ConsoleSink) -> Result<Value, String> {
        match self {
            Builtin::Print => {
                for arg in args {
                    console.put_str(&arg.to_string());
                }
                Ok(Value::None)
            }
            Builtin::Goto => {
                arity(self, args, 2)?;
                let row = int_arg(self, &args[0])?.max(0) as usize;
                let col = int_arg(self, &args[1])?.max(0) as usize;
                console.goto(row, col);
                Ok(Value::None)
            }
            Builtin::Newline => {
                arity(self, args, 0)?;
                console.newline();
                Ok(Value::None)
            }
            Builtin::Cls => {
                arity(self, args, 0)?;
                console.clear();
                Ok(Value::None)
            }
            Builtin::SetColor => {
                arity(self, args, 2)?;
                let fg = Rgb::from_int(int_arg(self, &args[0])?);
                let bg = Rgb::from_int(int_arg(self, &args[1])?);
                console.set_color(fg, bg);
                Ok(Value::None)
            }
            Builtin::SetFg => {
                arity(self, args, 1)?;
                let (_, bg) = console.colors();
                console.set_color(Rgb::from_int(int_arg(self, &args[0])?), bg);
                Ok(Value::None)
            }
            Builtin::SetBg => {
                arity(self, args, 1)?;
                let (fg, _) = console.colors();
                console.set_color(fg, Rgb::from_int(int_arg(self, &args[0])?));
                Ok(Value::None)
            }
            Builtin::Palette => {
                arity(self, args, 1)?;
                let idx = int_arg(self, &args[0])?;
                let color = usize::try_from(idx)
                    .ok()
                    .and_then(palette)
                    .ok_or_else(|| format!("palette index {} out of range 0..16", idx))?;
                Ok(Value::Int(color.0 as i64))
            }
            Builtin::Str => {
                arity(self, args, 1)?;
                Ok(Value::str(args[0].to_string()))
            }
            Builtin::Len => {
                arity(self, args, 1)?;
                Ok(Value::Int(str_arg(self, &args[0])?.chars().count() as i64))
            }
            Builtin::Upper => {
                arity(self, args, 1)?;
                Ok(Value::str(str_arg(self, &args[0])?.to_uppercase()))
            }
            Builtin::Lower => {
                arity(self, args, 1)?;
                Ok(Value::str(str_arg(self, &args[0])?.to_lowercase()))
            }
            Builtin::Substr => {
                // 1-based start, optional length
                if args.len() < 2 || args.len() > 3 {
                    return Err("substr() takes 2 or 3 arguments".to_string());
                }
                let s = str_arg(self, &args[0])?;
                let start = (int_arg(self, &args[1])?.max(1) - 1) as usize;
                let chars: Vec<char> = s.chars().collect();
                let len = match args.get(2) {
                    Some(n) => int_arg(self, n)?.max(0) as usize,
                    None => chars.len(),
                };
                Ok(Value::str(
                    chars.iter().skip(start).take(len).collect::<String>(),
                ))
            }
            Builtin::Left => {
                arity(self, args, 2)?;
                let s = str_arg(self, &args[0])?;
                let n = int_arg(self, &args[1])?.max(0) as usize;
                Ok(Value::str(s.chars().take(n).collect::<String>()))
            }
            Builtin::Right => {
                arity(self, args, 2)?;
                let s = str_arg(self, &args[0])?;
                let n = int_arg(self, &args[1])?.max(0) as usize;
                let count = s.chars().count();
                Ok(Value::str(
                    s.chars().skip(count.saturating_sub(n)).collect::<String>(),
                ))
            }
            Builtin::Val => {
                arity(self, args, 1)?;
                let text = args[0].to_string();
                let text = text.trim();
                if let Ok(v) = text.parse::<i64>() {
                    Ok(Value::Int(v))
                } else {
                    Ok(Value::Float(text.parse::<f64>().unwrap_or(0.0)))
                }
            }
            Builtin::Int => {
                arity(self, args, 1)?;
                match &args[0] {
                    Value::Str(s) => Ok(Value::Int(s.trim().parse::<i64>().unwrap_or(0))),
                    other => Ok(Value::Int(int_arg(self, other)?)),
                }
            }
        }
    }
}

fn arity(b: Builtin, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "{}() takes {} argument(s), got {}",
            b.name(),
            expected,
            args.len()
        ))
    }
}

fn int_arg(b: Builtin, v: &Value) -> Result<i64, String> {
    v.as_i64()
        .ok_or_else(|| format!("{}() expected a number, got {}", b.name(), v.type_name()))
}

fn str_arg(b: Builtin, v: &Value) -> Result<String, String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        Value::None => Ok(String::new()),
        other => Err(format!(
            "{}() expected a string, got {}",
            b.name(),
            other.type_name()
        )),
    }
}
