use crate::config::{EmitterConfig, OutputFormat};
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tone};
use crate::ir_emitter::IrEmitter;
use anyhow::anyhow;
use std::io::Write;
use synflow_core::analysis::ipa::ValueContext;
use synflow_core::analysis::{AnalysisStats, ErasedResult, Host, IpaHost, IpaResults};
use synflow_core::NodeId;

/// A finished inter-procedural run: the host that owns the contexts and
/// the results it returned.
#[derive(Clone, Copy)]
pub struct IpaReport<'a> {
    pub host: &'a IpaHost,
    pub results: &'a IpaResults,
}

/// Prints a function's graph with every analysis' values under each node.
pub struct ResultEmitter {
    config: EmitterConfig,
    ir: IrEmitter,
}

impl ResultEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            ir: IrEmitter::new(config.clone()),
            config,
        }
    }

    fn annotate<W: Write>(
        &self,
        node: NodeId,
        results: &[(&str, &dyn ErasedResult)],
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let width = results.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, result) in results {
            match result.describe(node).filter(|_| result.reached(node)) {
                Some((dfv_in, dfv_out)) => {
                    if self.config.halves.shows_in() {
                        let line = format!("{:<width$} in  {}", name, dfv_in, width = width);
                        EmitHelper::write_toned_line(writer, context, &line, Tone::Value)?;
                    }
                    if self.config.halves.shows_out() {
                        let line = format!("{:<width$} out {}", name, dfv_out, width = width);
                        EmitHelper::write_toned_line(writer, context, &line, Tone::Value)?;
                    }
                }
                None if self.config.hide_unreached => {}
                None => {
                    let line = format!("{:<width$} unreached", name, width = width);
                    EmitHelper::write_toned_line(writer, context, &line, Tone::Dead)?;
                }
            }
        }
        Ok(())
    }

    pub fn emit_stats<W: Write>(
        &self,
        stats: &AnalysisStats,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        if self.config.format == OutputFormat::Json {
            for line in serde_json::to_string_pretty(stats)?.lines() {
                EmitHelper::write_line(writer, context, line)?;
            }
            return Ok(());
        }
        EmitHelper::write_section(writer, context, "stats")?;
        let rows = [
            ("node visits", stats.node_visits),
            ("transfers", stats.transfers),
            ("widenings", stats.widenings),
            ("sim queries", stats.sim_queries),
            ("sim hits", stats.sim_hits),
            ("sim failures", stats.sim_failures),
            ("pending forced", stats.pending_forced),
            ("invalidations", stats.invalidations),
            ("calls resolved", stats.calls_resolved),
            ("contexts created", stats.contexts_created),
            ("contexts reused", stats.contexts_reused),
            ("contexts widened", stats.contexts_widened),
        ];
        for (label, value) in rows {
            EmitHelper::write_line(writer, context, &format!("{}: {}", label, value))?;
        }
        Ok(())
    }

    fn emit_context<W: Write>(
        &self,
        ctx: &ValueContext,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let mut header = format!("ctx{} {} depth {}", ctx.id, ctx.function, ctx.depth);
        if ctx.is_root() {
            header.push_str(" root");
        }
        EmitHelper::write_toned_line(writer, context, &header, Tone::Header)?;
        context.indent();
        if let Some(entry) = &ctx.entry {
            EmitHelper::write_line(writer, context, &format!("entry {}", entry))?;
        }
        for alias in &ctx.aliases {
            EmitHelper::write_line(writer, context, &format!("alias {}", alias))?;
        }
        if let Some(exit) = &ctx.exit {
            EmitHelper::write_line(writer, context, &format!("exit  {}", exit))?;
        }
        if !ctx.callers.is_empty() {
            let callers: Vec<String> = ctx
                .callers
                .iter()
                .map(|(caller, node)| format!("ctx{}@{}", caller, node))
                .collect();
            EmitHelper::write_line(writer, context, &format!("callers {}", callers.join(", ")))?;
        }
        context.dedent();
        Ok(())
    }
}

impl Default for ResultEmitter {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

impl Emitter<Host> for ResultEmitter {
    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(&self, host: &Host, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        let func = host
            .unit()
            .function(host.function())
            .ok_or_else(|| anyhow!("function {} is not in unit {}", host.function(), host.unit().name))?;
        let results: Vec<(&str, &dyn ErasedResult)> = host
            .analysis_names()
            .iter()
            .filter_map(|&name| host.get_analysis_results(name).ok().map(|r| (name, r)))
            .collect();
        let names: Vec<&str> = results.iter().map(|(name, _)| *name).collect();

        EmitHelper::write_section(
            writer,
            context,
            &format!("{}: {}", host.function(), names.join(", ")),
        )?;
        self.ir.emit_function_with(
            func,
            writer,
            context,
            &|from, to, label| host.is_edge_live(from, to, label),
            |node, w, ctx| self.annotate(node, &results, w, ctx),
        )?;
        self.emit_stats(host.stats(), writer, context)
    }
}

impl<'a> Emitter<IpaReport<'a>> for ResultEmitter {
    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(
        &self,
        report: &IpaReport<'a>,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        let unit = report.host.unit();
        for func in unit.functions.values() {
            let results: Vec<(&str, &dyn ErasedResult)> = report
                .results
                .analyses(func.name())
                .filter_map(|name| report.results.get(func.name(), name).map(|r| (name, r)))
                .collect();
            if results.is_empty() {
                continue;
            }
            let names: Vec<&str> = results.iter().map(|(name, _)| *name).collect();
            EmitHelper::write_section(
                writer,
                context,
                &format!("{}: {}", func.name(), names.join(", ")),
            )?;
            self.ir.emit_function_with(
                func,
                writer,
                context,
                &|_, _, _| true,
                |node, w, ctx| self.annotate(node, &results, w, ctx),
            )?;
        }

        EmitHelper::write_section(writer, context, "contexts")?;
        for ctx in report.host.contexts().iter() {
            self.emit_context(ctx, writer, context)?;
        }
        self.emit_stats(report.results.stats(), writer, context)
    }
}
