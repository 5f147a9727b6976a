use crate::config::EmitterConfig;
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

pub type EmitResult = Result<()>;

#[derive(Debug, Clone)]
pub struct EmitContext {
    pub indent_level: usize,
    pub indent_chars: String,
    pub use_colors: bool,
}

impl EmitContext {
    pub fn new() -> Self {
        Self {
            indent_level: 0,
            indent_chars: "    ".to_string(),
            use_colors: true,
        }
    }

    pub fn from_config(config: &EmitterConfig) -> Self {
        Self {
            indent_level: 0,
            indent_chars: config.indent_style.unit(),
            use_colors: config.use_colors,
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn get_indent(&self) -> String {
        self.indent_chars.repeat(self.indent_level)
    }

    pub fn nested(&self) -> Self {
        let mut ctx = self.clone();
        ctx.indent();
        ctx
    }
}

impl Default for EmitContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a line shows, which decides its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Header,
    Section,
    Comment,
    Value,
    Dead,
}

impl Tone {
    fn paint(self, text: &str) -> String {
        match self {
            Tone::Plain => text.to_string(),
            Tone::Header => text.bold().to_string(),
            Tone::Section => text.cyan().to_string(),
            Tone::Comment => text.green().to_string(),
            Tone::Value => text.yellow().to_string(),
            Tone::Dead => text.bright_black().to_string(),
        }
    }
}

pub trait Emitter<T: ?Sized> {
    fn config(&self) -> &EmitterConfig;

    fn emit<W: Write>(&self, item: &T, writer: &mut W, context: &mut EmitContext) -> EmitResult;

    fn emit_to_string(&self, item: &T) -> Result<String> {
        let mut buffer = Vec::new();
        let mut context = EmitContext::from_config(self.config());
        self.emit(item, &mut buffer, &mut context)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct EmitHelper;

impl EmitHelper {
    pub fn write_line<W: Write>(writer: &mut W, context: &EmitContext, text: &str) -> EmitResult {
        writeln!(writer, "{}{}", context.get_indent(), text)?;
        Ok(())
    }

    pub fn write_toned_line<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        text: &str,
        tone: Tone,
    ) -> EmitResult {
        if context.use_colors {
            writeln!(writer, "{}{}", context.get_indent(), tone.paint(text))?;
        } else {
            Self::write_line(writer, context, text)?;
        }
        Ok(())
    }

    pub fn write_comment<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        comment: &str,
    ) -> EmitResult {
        Self::write_toned_line(writer, context, &format!("// {}", comment), Tone::Comment)
    }

    pub fn write_section<W: Write>(
        writer: &mut W,
        context: &EmitContext,
        title: &str,
    ) -> EmitResult {
        Self::write_toned_line(writer, context, &format!("=== {} ===", title), Tone::Section)
    }

    pub fn write_blank<W: Write>(writer: &mut W) -> EmitResult {
        writeln!(writer)?;
        Ok(())
    }

    pub fn write_block<W: Write, F>(
        writer: &mut W,
        context: &mut EmitContext,
        header: &str,
        body: F,
    ) -> EmitResult
    where
        F: FnOnce(&mut W, &mut EmitContext) -> EmitResult,
    {
        Self::write_toned_line(writer, context, &format!("{} {{", header), Tone::Header)?;
        context.indent();
        body(writer, context)?;
        context.dedent();
        Self::write_line(writer, context, "}")?;
        Ok(())
    }
}
