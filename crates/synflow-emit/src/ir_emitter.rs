use crate::config::EmitterConfig;
use crate::emitter::{EmitContext, EmitHelper, EmitResult, Emitter, Tone};
use std::io::Write;
use synflow_core::{Cfg, EdgeLabel, Function, NodeId, TranslationUnit};

/// Decides whether an edge is still live. The plain IR printer treats
/// every edge as live.
pub type EdgeFilter<'a> = &'a dyn Fn(NodeId, NodeId, EdgeLabel) -> bool;

pub struct IrEmitter {
    config: EmitterConfig,
}

impl IrEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    /// `fn name(params) -> ret`, with parameter types when configured.
    pub fn signature_line(&self, func: &Function) -> String {
        let params: Vec<String> = func
            .params()
            .iter()
            .map(|p| {
                if self.config.show_types {
                    format!("{}: {}", p.name, p.ty)
                } else {
                    p.name.clone()
                }
            })
            .collect();
        let mut params = params.join(", ");
        if func.is_variadic() {
            if !params.is_empty() {
                params.push_str(", ");
            }
            params.push_str("...");
        }
        format!("fn {}({}) -> {}", func.name(), params, func.signature.ret)
    }

    /// One node: id, instruction and, when configured, its successors.
    pub fn node_line(&self, cfg: &Cfg, node: NodeId, live: EdgeFilter<'_>) -> Option<String> {
        let instr = cfg.instr(node)?;
        let mut line = format!("{}: {}", node, instr);
        let succs = cfg.successors(node);
        if self.config.show_edges && !succs.is_empty() {
            let edges: Vec<String> = succs
                .iter()
                .map(|&(to, label)| {
                    let dead = !live(node, to, label);
                    match (label, dead) {
                        (EdgeLabel::Uncond, false) => to.to_string(),
                        (EdgeLabel::Uncond, true) => format!("{} [dead]", to),
                        (_, false) => format!("{} [{}]", to, label),
                        (_, true) => format!("{} [{} dead]", to, label),
                    }
                })
                .collect();
            line.push_str(" -> ");
            line.push_str(&edges.join(", "));
        }
        Some(line)
    }

    pub(crate) fn emit_function_with<W: Write>(
        &self,
        func: &Function,
        writer: &mut W,
        context: &mut EmitContext,
        live: EdgeFilter<'_>,
        mut annotate: impl FnMut(NodeId, &mut W, &mut EmitContext) -> EmitResult,
    ) -> EmitResult {
        let Some(cfg) = &func.body else {
            let header = format!("declare {}", self.signature_line(func));
            return EmitHelper::write_toned_line(writer, context, &header, Tone::Header);
        };
        EmitHelper::write_block(writer, context, &self.signature_line(func), |w, ctx| {
            for (name, ty) in &func.locals {
                let line = if self.config.show_types {
                    format!("local {}: {}", name, ty)
                } else {
                    format!("local {}", name)
                };
                EmitHelper::write_line(w, ctx, &line)?;
            }
            for node in cfg.reverse_postorder() {
                if let Some(line) = self.node_line(cfg, node, live) {
                    EmitHelper::write_line(w, ctx, &line)?;
                    ctx.indent();
                    annotate(node, w, ctx)?;
                    ctx.dedent();
                }
            }
            Ok(())
        })
    }
}

impl Default for IrEmitter {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

impl Emitter<Function> for IrEmitter {
    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(&self, func: &Function, writer: &mut W, context: &mut EmitContext) -> EmitResult {
        self.emit_function_with(func, writer, context, &|_, _, _| true, |_, _, _| Ok(()))
    }
}

impl Emitter<TranslationUnit> for IrEmitter {
    fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn emit<W: Write>(
        &self,
        unit: &TranslationUnit,
        writer: &mut W,
        context: &mut EmitContext,
    ) -> EmitResult {
        EmitHelper::write_toned_line(writer, context, &format!("unit {}", unit.name), Tone::Header)?;
        for (name, ty) in &unit.globals {
            EmitHelper::write_line(writer, context, &format!("global {}: {}", name, ty))?;
        }
        for func in unit.functions.values() {
            EmitHelper::write_blank(writer)?;
            Emitter::<Function>::emit(self, func, writer, context)?;
        }
        Ok(())
    }
}
