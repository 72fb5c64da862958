//! Rhai-backed rule sets.

use std::path::PathBuf;

use rhai::{AST, Dynamic, Engine, FnAccess, Module, Scope};

use super::contract::{
    EntryPoint, FunctionNames, MemberReply, MemberRequest, RuleSet, TagReply, WayReply,
};
use super::error::TransformError;
use super::marshal::{
    decode_flag, decode_int, decode_superseded, decode_tags, encode_count, encode_members,
    encode_roles, encode_tags, split_reply,
};
use crate::config::TransformConfig;
use crate::tags::TagList;

/// Argument names the entry points are called with, by arity.
const TAG_ARGS: [&str; 2] = ["tags", "num_tags"];
const MEMBER_ARGS: [&str; 4] = ["tags", "member_tags", "member_roles", "member_count"];

/// A loaded style script together with the interpreter state it owns.
///
/// The script's top-level code runs once, at load. Its functions and the
/// constants it declared live on in a module registered with the engine, so
/// entry points can read load-time tables through `global::NAME`.
///
/// The engine is not shareable across threads; each worker loads its own.
pub struct ScriptRuleSet {
    engine: Engine,
    /// One compiled call expression per entry point, in [`EntryPoint::ALL`] order.
    calls: Vec<AST>,
    scope: Scope<'static>,
    names: FunctionNames,
    origin: PathBuf,
}

impl std::fmt::Debug for ScriptRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuleSet")
            .field("origin", &self.origin)
            .field("names", &self.names)
            .finish()
    }
}

fn build_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(max_operations);
    engine.on_print(|text| tracing::info!(target: "tagxform::script", "{}", text));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "tagxform::script", "{}{}: {}", source.unwrap_or(""), pos, text)
    });
    engine
}

fn arg_names(entry: EntryPoint) -> &'static [&'static str] {
    match entry {
        EntryPoint::RelationMember => &MEMBER_ARGS,
        _ => &TAG_ARGS,
    }
}

impl ScriptRuleSet {
    /// Compile the configured script, run its top-level code and check that
    /// every entry point is defined.
    pub fn load(config: &TransformConfig) -> Result<Self, TransformError> {
        let engine = build_engine(config.max_operations);
        let ast = engine
            .compile_file(config.script_path.clone())
            .map_err(|err| TransformError::Script {
                path: config.script_path.clone(),
                message: err.to_string(),
            })?;
        Self::from_ast(
            engine,
            ast,
            config.function_names(),
            config.script_path.clone(),
        )
    }

    /// Same as [`ScriptRuleSet::load`] for a script held in memory.
    pub fn from_source(source: &str, names: FunctionNames) -> Result<Self, TransformError> {
        let engine = build_engine(0);
        let origin = PathBuf::from("<inline>");
        let ast = engine
            .compile(source)
            .map_err(|err| TransformError::Script {
                path: origin.clone(),
                message: err.to_string(),
            })?;
        Self::from_ast(engine, ast, names, origin)
    }

    fn from_ast(
        mut engine: Engine,
        ast: AST,
        names: FunctionNames,
        origin: PathBuf,
    ) -> Result<Self, TransformError> {
        let script_error = |message: String| TransformError::Script {
            path: origin.clone(),
            message,
        };

        for entry in EntryPoint::ALL {
            let name = names.get(entry);
            let defined = ast.iter_functions().any(|f| {
                f.name == name
                    && f.params.len() == entry.arity()
                    && !matches!(f.access, FnAccess::Private)
            });
            if !defined {
                return Err(TransformError::MissingFunction {
                    name: name.to_string(),
                    arity: entry.arity(),
                });
            }
        }

        // Top-level code runs here and never again.
        let module = Module::eval_ast_as_new(Scope::new(), &ast, &engine)
            .map_err(|err| script_error(err.to_string()))?;
        engine.register_global_module(module.into());

        let calls = EntryPoint::ALL
            .iter()
            .map(|&entry| {
                let source = format!("{}({})", names.get(entry), arg_names(entry).join(", "));
                engine
                    .compile(source)
                    .map_err(|err| script_error(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Loaded tag transform style {:?}", origin);
        Ok(Self {
            engine,
            calls,
            scope: Scope::new(),
            names,
            origin,
        })
    }

    /// Invoke an entry point. The argument scope is cleared before every
    /// call, also after one that failed.
    fn call(&mut self, entry: EntryPoint, args: Vec<Dynamic>) -> Result<Dynamic, TransformError> {
        self.scope.clear();
        for (name, value) in arg_names(entry).iter().zip(args) {
            self.scope.push_dynamic(*name, value);
        }
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &self.calls[entry as usize]);
        self.scope.clear();

        result.map_err(|err| TransformError::Execution {
            function: self.names.get(entry).to_string(),
            message: err.to_string(),
        })
    }

    fn filter_tags(
        &mut self,
        entry: EntryPoint,
        tags: &TagList,
        count: usize,
    ) -> Result<TagReply, TransformError> {
        let value = self.call(entry, tag_args(tags, count))?;
        let function = self.names.get(entry);

        let [drop, out] = split_reply::<2>(value);
        let tags = decode_tags(function, out, tags)?;
        Ok(TagReply {
            drop: decode_flag(&drop),
            tags,
        })
    }
}

fn tag_args(tags: &TagList, count: usize) -> Vec<Dynamic> {
    vec![
        Dynamic::from_map(encode_tags(tags)),
        Dynamic::from_int(encode_count(count)),
    ]
}

impl RuleSet for ScriptRuleSet {
    fn filter_node(&mut self, tags: &TagList, count: usize) -> Result<TagReply, TransformError> {
        self.filter_tags(EntryPoint::Node, tags, count)
    }

    fn filter_way(&mut self, tags: &TagList, count: usize) -> Result<WayReply, TransformError> {
        let value = self.call(EntryPoint::Way, tag_args(tags, count))?;
        let function = self.names.get(EntryPoint::Way);

        let [drop, out, polygon, roads] = split_reply::<4>(value);
        let roads = decode_int(&roads);
        let polygon = decode_int(&polygon);
        let tags = decode_tags(function, out, tags)?;
        Ok(WayReply {
            drop: decode_flag(&drop),
            tags,
            polygon,
            roads,
        })
    }

    fn filter_relation(
        &mut self,
        tags: &TagList,
        count: usize,
    ) -> Result<TagReply, TransformError> {
        self.filter_tags(EntryPoint::Relation, tags, count)
    }

    fn filter_relation_member(
        &mut self,
        request: &MemberRequest<'_>,
    ) -> Result<MemberReply, TransformError> {
        let count = request.member_count();
        let args = vec![
            Dynamic::from_map(encode_tags(request.relation_tags)),
            Dynamic::from_array(encode_members(request.member_tags)),
            Dynamic::from_array(encode_roles(request.roles)),
            Dynamic::from_int(encode_count(count)),
        ];
        let value = self.call(EntryPoint::RelationMember, args)?;
        let function = self.names.get(EntryPoint::RelationMember);

        let [drop, out, superseded, boundary, polygon, roads] = split_reply::<6>(value);
        let roads = decode_int(&roads);
        let make_polygon = decode_int(&polygon);
        let make_boundary = decode_int(&boundary);
        let member_superseded = decode_superseded(function, superseded, count)?;
        let tags = decode_tags(function, out, request.relation_tags)?;
        Ok(MemberReply {
            drop: decode_flag(&drop),
            tags,
            member_superseded,
            make_boundary,
            make_polygon,
            roads,
        })
    }
}

impl Drop for ScriptRuleSet {
    fn drop(&mut self) {
        tracing::debug!("Releasing tag transform style {:?}", self.origin);
    }
}
