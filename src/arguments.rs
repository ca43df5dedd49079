// Lambdacore Argument Binding
//
// Walks a classified LambdaListHandler against one call's actual arguments
// and establishes bindings through a ScopeManager: lexical targets go to the
// scope's storage, special targets push dynamic bindings that unwind in LIFO
// order when the scope is dropped (including during a panic unwind).
//
// Binding order is fixed: required, optional, arity-excess check, rest,
// keyword, aux. Keyword scan is first-occurrence-wins and only runs when the
// handler declares keyword parameters.

use log::{debug, trace};

use crate::conditions::CallError;
use crate::context::RuntimeContext;
use crate::dynamic::DynamicScope;
use crate::environment::Environment;
use crate::frame::{StackFrame, Vaslist};
use crate::lambda_list::{LambdaListHandler, RequiredTarget, Target, TargetIndex};
use crate::types::{TaggedValue, VaslistRef};

/// Evaluates default-value and aux initializer forms. The lexical
/// environment is the one accumulated so far, so later defaults see
/// earlier bindings; frame-backed scopes pass None.
pub trait EvalHook {
    fn eval(
        &mut self,
        ctx: &mut RuntimeContext,
        form: TaggedValue,
        env: Option<&Environment>,
    ) -> Result<TaggedValue, CallError>;
}

impl<F> EvalHook for F
where
    F: FnMut(&mut RuntimeContext, TaggedValue, Option<&Environment>) -> Result<TaggedValue, CallError>,
{
    fn eval(
        &mut self,
        ctx: &mut RuntimeContext,
        form: TaggedValue,
        env: Option<&Environment>,
    ) -> Result<TaggedValue, CallError> {
        self(ctx, form, env)
    }
}

/// Where one call's bindings land. Lexical targets go to scope-specific
/// storage; special targets always become dynamic bindings whose previous
/// values are restored when the scope is dropped.
pub trait ScopeManager {
    fn new_binding(
        &mut self,
        ctx: &RuntimeContext,
        target: &Target,
        value: TaggedValue,
    ) -> Result<(), CallError>;

    /// Bind a &va-rest target to an escaped argument cursor. Specials
    /// cannot hold one.
    fn va_rest_binding(
        &mut self,
        ctx: &RuntimeContext,
        target: &Target,
        r: VaslistRef,
    ) -> Result<(), CallError>;

    /// Pre-mark a lexical target unbound ahead of the keyword scan.
    fn ensure_lexical_element_unbound(&mut self, target: &Target);

    fn lexical_element_bound(&self, target: &Target) -> bool;

    /// The lexical environment accumulated so far, if this scope has one.
    fn lexenv(&self) -> Option<Environment>;
}

fn special_error(ctx: &RuntimeContext, target: &Target) -> CallError {
    CallError::VaRestBoundToSpecial {
        symbol: ctx
            .symbols
            .symbol_name(target.symbol)
            .unwrap_or("?")
            .to_string(),
    }
}

/// Environment-backed scope for interpreted calls.
pub struct EnvironmentScope {
    env: Environment,
    dynamics: DynamicScope,
}

impl EnvironmentScope {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            dynamics: DynamicScope::new(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }
}

impl ScopeManager for EnvironmentScope {
    fn new_binding(
        &mut self,
        _ctx: &RuntimeContext,
        target: &Target,
        value: TaggedValue,
    ) -> Result<(), CallError> {
        match target.index {
            TargetIndex::Special => self.dynamics.bind(target.symbol, value),
            _ => self.env.bind(target.symbol, value),
        }
        Ok(())
    }

    fn va_rest_binding(
        &mut self,
        ctx: &RuntimeContext,
        target: &Target,
        r: VaslistRef,
    ) -> Result<(), CallError> {
        if target.index == TargetIndex::Special {
            return Err(special_error(ctx, target));
        }
        self.env.bind(target.symbol, TaggedValue::VaRest(r));
        Ok(())
    }

    fn ensure_lexical_element_unbound(&mut self, target: &Target) {
        if target.index != TargetIndex::Special {
            self.env.mark_unbound(target.symbol);
        }
    }

    fn lexical_element_bound(&self, target: &Target) -> bool {
        self.env.is_bound(target.symbol)
    }

    fn lexenv(&self) -> Option<Environment> {
        Some(self.env.clone())
    }
}

/// Frame-backed scope for compiled calls: lexical targets write slots by
/// classified index.
pub struct StackFrameScope<'a> {
    frame: &'a mut StackFrame,
    dynamics: DynamicScope,
}

impl<'a> StackFrameScope<'a> {
    pub fn new(frame: &'a mut StackFrame) -> Self {
        Self {
            frame,
            dynamics: DynamicScope::new(),
        }
    }
}

impl ScopeManager for StackFrameScope<'_> {
    fn new_binding(
        &mut self,
        _ctx: &RuntimeContext,
        target: &Target,
        value: TaggedValue,
    ) -> Result<(), CallError> {
        match target.index {
            TargetIndex::Special => self.dynamics.bind(target.symbol, value),
            TargetIndex::Lexical(idx) => self.frame.set(idx, value),
            TargetIndex::Undefined => {}
        }
        Ok(())
    }

    fn va_rest_binding(
        &mut self,
        ctx: &RuntimeContext,
        target: &Target,
        r: VaslistRef,
    ) -> Result<(), CallError> {
        match target.index {
            TargetIndex::Special => Err(special_error(ctx, target)),
            TargetIndex::Lexical(idx) => {
                self.frame.set(idx, TaggedValue::VaRest(r));
                Ok(())
            }
            TargetIndex::Undefined => Ok(()),
        }
    }

    fn ensure_lexical_element_unbound(&mut self, target: &Target) {
        if let TargetIndex::Lexical(idx) = target.index {
            self.frame.make_unbound(idx);
        }
    }

    fn lexical_element_bound(&self, target: &Target) -> bool {
        match target.index {
            TargetIndex::Lexical(idx) => self.frame.is_bound(idx),
            _ => false,
        }
    }

    fn lexenv(&self) -> Option<Environment> {
        None
    }
}

fn eval_form(
    eval: &mut dyn EvalHook,
    ctx: &mut RuntimeContext,
    form: TaggedValue,
    scope: &dyn ScopeManager,
) -> Result<TaggedValue, CallError> {
    let env = scope.lexenv();
    eval.eval(ctx, form, env.as_ref())
}

fn supplied_true(ctx: &RuntimeContext) -> TaggedValue {
    TaggedValue::Symbol(ctx.markers.sym_t)
}

/// Bind `args` against `handler` into `scope`.
///
/// `function_name` only labels errors. Special bindings established here
/// are torn down when `scope` is dropped.
pub fn create_bindings_in_scope(
    handler: &LambdaListHandler,
    ctx: &mut RuntimeContext,
    function_name: &str,
    args: &[TaggedValue],
    scope: &mut dyn ScopeManager,
    eval: &mut dyn EvalHook,
) -> Result<(), CallError> {
    if !handler.creates_bindings() {
        return Ok(());
    }
    let (min, max) = handler.arity();
    let mut vaslist = Vaslist::new(args);
    trace!(
        "binding {} arguments for {} (min {}, max {:?})",
        vaslist.total_nargs(),
        function_name,
        min,
        max
    );

    // required
    for req in handler.required_arguments() {
        let value = vaslist.next_arg().ok_or_else(|| CallError::TooFewArguments {
            function: function_name.to_string(),
            given: args.len(),
            min,
            max,
        })?;
        match &req.target {
            RequiredTarget::Var(target) => {
                scope.new_binding(ctx, target, value)?;
            }
            RequiredTarget::Destructure(sub) => {
                let parts = ctx.heap.list_to_vec(value).ok_or_else(|| {
                    CallError::DestructureMismatch {
                        function: function_name.to_string(),
                    }
                })?;
                create_bindings_in_scope(sub, ctx, function_name, &parts, scope, eval)?;
            }
        }
    }

    // optional
    for opt in handler.optional_arguments() {
        match vaslist.next_arg() {
            Some(value) => {
                scope.new_binding(ctx, &opt.target, value)?;
                if let Some(supplied) = &opt.supplied_p {
                    let t = supplied_true(ctx);
                    scope.new_binding(ctx, supplied, t)?;
                }
            }
            None => {
                let value = eval_form(eval, ctx, opt.default, scope)?;
                scope.new_binding(ctx, &opt.target, value)?;
                if let Some(supplied) = &opt.supplied_p {
                    scope.new_binding(ctx, supplied, TaggedValue::Nil)?;
                }
            }
        }
    }

    // arity excess: without a rest or keyword sink the leftovers are fatal
    if vaslist.remaining_nargs() > 0
        && handler.rest_argument().is_none()
        && handler.keyword_arguments().is_empty()
    {
        debug!(
            "{} called with {} excess arguments",
            function_name,
            vaslist.remaining_nargs()
        );
        return Err(CallError::TooManyArguments {
            function: function_name.to_string(),
            given: args.len(),
            min,
            max,
        });
    }

    // rest: captures the tail without consuming it, so the keyword scan
    // still sees the same arguments
    if let Some(rest) = handler.rest_argument() {
        if rest.va_rest {
            scope.va_rest_binding(ctx, &rest.target, vaslist.va_rest_ref())?;
        } else {
            let list = ctx.heap.list_from_slice(vaslist.remaining());
            scope.new_binding(ctx, &rest.target, list)?;
        }
    }

    if !handler.keyword_arguments().is_empty() {
        bind_keywords(handler, ctx, function_name, &vaslist, scope, eval)?;
    }

    // aux, in order; earlier bindings are visible to later initializers
    for aux in handler.aux_arguments() {
        let value = match aux.expression {
            Some(expr) => eval_form(eval, ctx, expr, scope)?,
            None => TaggedValue::Nil,
        };
        scope.new_binding(ctx, &aux.target, value)?;
    }

    Ok(())
}

fn bind_keywords(
    handler: &LambdaListHandler,
    ctx: &mut RuntimeContext,
    function_name: &str,
    vaslist: &Vaslist<'_>,
    scope: &mut dyn ScopeManager,
    eval: &mut dyn EvalHook,
) -> Result<(), CallError> {
    let tail = vaslist.remaining();
    if tail.len() % 2 != 0 {
        return Err(CallError::OddKeywordArguments {
            function: function_name.to_string(),
            given: tail.len(),
        });
    }

    let keywords = handler.keyword_arguments();

    // lexical targets and sensors start explicitly unbound; specials track
    // boundness locally to avoid clobbering outer dynamic bindings
    for key in keywords {
        scope.ensure_lexical_element_unbound(&key.target);
        if let Some(supplied) = &key.supplied_p {
            scope.ensure_lexical_element_unbound(supplied);
        }
    }
    let mut bound = vec![false; keywords.len()];

    // a runtime :allow-other-keys t in the tail lifts the declaration,
    // first occurrence deciding
    let mut allow_effective = handler.allow_other_keys();
    for pair in tail.chunks_exact(2) {
        if pair[0].as_symbol() == Some(ctx.markers.kw_allow_other_keys) {
            if pair[1].truthy() {
                allow_effective = true;
            }
            break;
        }
    }

    for pair in tail.chunks_exact(2) {
        let keyword = pair[0];
        let value = pair[1];
        // only keyword symbols participate in the scan; anything else in
        // the tail passes through untouched (it is still visible to a
        // rest parameter)
        let keyword_sym = match keyword.as_symbol() {
            Some(sym) if ctx.symbols.is_keyword(sym) => sym,
            _ => continue,
        };

        let mut recognized = keyword_sym == ctx.markers.kw_allow_other_keys;
        for (i, key) in keywords.iter().enumerate() {
            if keyword_sym == key.keyword {
                recognized = true;
                if !bound[i] {
                    bound[i] = true;
                    scope.new_binding(ctx, &key.target, value)?;
                    if let Some(supplied) = &key.supplied_p {
                        let t = supplied_true(ctx);
                        scope.new_binding(ctx, supplied, t)?;
                    }
                } else {
                    trace!(
                        "{}: duplicate keyword occurrence ignored (first wins)",
                        function_name
                    );
                }
                break;
            }
        }

        if !recognized && !allow_effective {
            let name = ctx
                .symbols
                .symbol_name(keyword_sym)
                .unwrap_or("?")
                .to_string();
            let recognized_names = keywords
                .iter()
                .filter_map(|k| ctx.symbols.symbol_name(k.keyword))
                .map(str::to_string)
                .collect();
            return Err(CallError::UnrecognizedKeyword {
                function: function_name.to_string(),
                keyword: name,
                recognized: recognized_names,
            });
        }
    }

    // defaults for keywords never supplied
    for (i, key) in keywords.iter().enumerate() {
        if !bound[i] {
            let value = eval_form(eval, ctx, key.default, scope)?;
            scope.new_binding(ctx, &key.target, value)?;
            if let Some(supplied) = &key.supplied_p {
                scope.new_binding(ctx, supplied, TaggedValue::Nil)?;
            }
        }
    }

    Ok(())
}
