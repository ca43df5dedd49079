// Lambdacore Lambda List Handler
//
// Parses a lambda list into ordered argument descriptors, classifies every
// binding target as a special variable or an indexed lexical slot, and keeps
// the result around for reuse on every call to the owning function.
//
// Parsing walks the list left to right under a mode state machine whose
// transitions are driven by the marker symbols (&optional, &rest, ...).
// Classification assigns lexical slot indices in binding order, skipping
// externally reserved indices, and records declared specials that never
// appear as binding targets as implicit special entries.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use log::trace;

use crate::conditions::LambdaListError;
use crate::context::{Markers, RuntimeContext};
use crate::symbol::{SymbolId, SymbolTable};
use crate::types::TaggedValue;

/// The definition form a lambda list appears in. Each context restricts
/// which modes are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaListContext {
    Function,
    Macro,
    DestructuringBind,
    Deftype,
    Method,
    GenericFunction,
    Defsetf,
    DefineModifyMacro,
    /// Accept-anything context used by internal callers
    Wildcard,
}

impl fmt::Display for LambdaListContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LambdaListContext::Function => "function",
            LambdaListContext::Macro => "macro",
            LambdaListContext::DestructuringBind => "destructuring-bind",
            LambdaListContext::Deftype => "deftype",
            LambdaListContext::Method => "method",
            LambdaListContext::GenericFunction => "generic-function",
            LambdaListContext::Defsetf => "defsetf",
            LambdaListContext::DefineModifyMacro => "define-modify-macro",
            LambdaListContext::Wildcard => "wildcard",
        };
        write!(f, "{}", name)
    }
}

/// Parser mode. Initial mode is Required; markers switch modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentMode {
    Required,
    Optional,
    Rest,
    VaRest,
    Keyword,
    AllowOtherKeys,
    Aux,
    DotRest,
}

impl fmt::Display for ArgumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentMode::Required => "required",
            ArgumentMode::Optional => "optional",
            ArgumentMode::Rest => "rest",
            ArgumentMode::VaRest => "va-rest",
            ArgumentMode::Keyword => "keyword",
            ArgumentMode::AllowOtherKeys => "allow-other-keys",
            ArgumentMode::Aux => "aux",
            ArgumentMode::DotRest => ".rest",
        };
        write!(f, "{}", name)
    }
}

/// Storage classification of one binding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIndex {
    /// Not yet classified
    Undefined,
    /// Dynamically bound special variable; consumes no slot
    Special,
    /// Indexed slot in the call's lexical frame
    Lexical(usize),
}

/// A binding target: the symbol plus where its value goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub symbol: SymbolId,
    pub index: TargetIndex,
}

impl Target {
    pub fn new(symbol: SymbolId) -> Self {
        Self {
            symbol,
            index: TargetIndex::Undefined,
        }
    }

    pub fn is_special(&self) -> bool {
        self.index == TargetIndex::Special
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self.index, TargetIndex::Lexical(_))
    }
}

/// A required parameter: a plain target, or a nested handler for
/// destructuring contexts.
#[derive(Debug)]
pub enum RequiredTarget {
    Var(Target),
    Destructure(Box<LambdaListHandler>),
}

#[derive(Debug)]
pub struct RequiredArgument {
    pub target: RequiredTarget,
}

#[derive(Debug)]
pub struct OptionalArgument {
    pub target: Target,
    /// Default-value form, evaluated when the argument is absent
    pub default: TaggedValue,
    pub supplied_p: Option<Target>,
}

#[derive(Debug)]
pub struct RestArgument {
    pub target: Target,
    /// Capture as a zero-copy cursor instead of an allocated list
    pub va_rest: bool,
}

#[derive(Debug)]
pub struct KeywordArgument {
    /// The keyword callers pass (KEYWORD package)
    pub keyword: SymbolId,
    pub target: Target,
    pub default: TaggedValue,
    pub supplied_p: Option<Target>,
}

#[derive(Debug)]
pub struct AuxArgument {
    pub target: Target,
    /// Initializer form; NIL binding when absent
    pub expression: Option<TaggedValue>,
}

/// Final classification of one bound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedSymbol {
    Special(SymbolId),
    Lexical { symbol: SymbolId, index: usize },
}

/// Single-dispatch information recorded for method lambda lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchInfo {
    pub symbol: SymbolId,
    pub class_name: Option<SymbolId>,
    pub index: usize,
}

// ---------------------------------------------------------------------
// Mode state machine

fn marker_mode(markers: &Markers, sym: SymbolId) -> Option<ArgumentMode> {
    if sym == markers.amp_optional {
        Some(ArgumentMode::Optional)
    } else if sym == markers.amp_rest || sym == markers.amp_body {
        Some(ArgumentMode::Rest)
    } else if sym == markers.amp_va_rest {
        Some(ArgumentMode::VaRest)
    } else if sym == markers.amp_key {
        Some(ArgumentMode::Keyword)
    } else if sym == markers.amp_allow_other_keys {
        Some(ArgumentMode::AllowOtherKeys)
    } else if sym == markers.amp_aux {
        Some(ArgumentMode::Aux)
    } else if sym == markers.dot {
        Some(ArgumentMode::DotRest)
    } else {
        None
    }
}

/// Legal (state, marker-target) transitions. Everything else is an
/// illegal-marker error.
fn transition_legal(current: ArgumentMode, target: ArgumentMode) -> bool {
    use ArgumentMode::*;
    matches!(
        (current, target),
        (Required, Optional | Rest | VaRest | Keyword | Aux | DotRest)
            | (Optional, Rest | VaRest | Keyword | Aux | DotRest)
            | (Rest | VaRest, Keyword | Aux | DotRest)
            | (Keyword, AllowOtherKeys | Aux)
            | (AllowOtherKeys, Aux)
    )
}

fn check_mode_for_context(
    mode: ArgumentMode,
    context: LambdaListContext,
) -> Result<(), LambdaListError> {
    use LambdaListContext::*;
    if context == Wildcard {
        return Ok(());
    }
    let illegal = match mode {
        ArgumentMode::Keyword | ArgumentMode::AllowOtherKeys => context == DefineModifyMacro,
        ArgumentMode::Aux => {
            matches!(context, GenericFunction | Defsetf | DefineModifyMacro)
        }
        ArgumentMode::DotRest => !matches!(context, Macro | DestructuringBind | Deftype),
        _ => false,
    };
    if illegal {
        Err(LambdaListError::IllegalModeForContext { mode, context })
    } else {
        Ok(())
    }
}

/// If `sym` is a mode marker, validate and perform the transition.
/// Returns Ok(true) when the symbol was consumed as a marker.
fn switch_argument_mode(
    markers: &Markers,
    symbols: &SymbolTable,
    context: LambdaListContext,
    sym: SymbolId,
    mode: &mut ArgumentMode,
    key_flag: &mut bool,
) -> Result<bool, LambdaListError> {
    let target = match marker_mode(markers, sym) {
        Some(t) => t,
        None => return Ok(false),
    };
    if !transition_legal(*mode, target) {
        return Err(LambdaListError::IllegalMarker {
            mode: *mode,
            marker: symbols.symbol_name(sym).unwrap_or("?").to_string(),
        });
    }
    check_mode_for_context(target, context)?;
    if target == ArgumentMode::Keyword {
        *key_flag = true;
    }
    trace!("lambda-list mode {} -> {}", mode, target);
    *mode = target;
    Ok(true)
}

// ---------------------------------------------------------------------
// Target classification

/// Assigns storage to binding targets in binding order. Lexical slot
/// indices increase monotonically, skipping externally reserved indices;
/// special targets consume no index.
pub struct TargetClassifier {
    declared_special: Vec<SymbolId>,
    locally_special: Vec<SymbolId>,
    classified: Vec<ClassifiedSymbol>,
    next_lexical: usize,
    skip: BTreeSet<usize>,
    lexical_count: usize,
}

pub struct ClassificationResult {
    pub classified: Vec<ClassifiedSymbol>,
    pub special_count: usize,
    pub lexical_count: usize,
}

impl TargetClassifier {
    pub fn new(declared_special: Vec<SymbolId>, skip: BTreeSet<usize>) -> Self {
        let mut classifier = Self {
            declared_special,
            locally_special: Vec::new(),
            classified: Vec::new(),
            next_lexical: 0,
            skip,
            lexical_count: 0,
        };
        while classifier.skip.contains(&classifier.next_lexical) {
            classifier.next_lexical += 1;
        }
        classifier
    }

    fn advance_lexical_index(&mut self) {
        loop {
            self.next_lexical += 1;
            if !self.skip.contains(&self.next_lexical) {
                return;
            }
        }
    }

    pub fn classify_target(&mut self, target: &mut Target, symbols: &SymbolTable) {
        let sym = target.symbol;
        if symbols.is_special(sym) || self.declared_special.contains(&sym) {
            target.index = TargetIndex::Special;
            self.classified.push(ClassifiedSymbol::Special(sym));
            if !self.locally_special.contains(&sym) {
                self.locally_special.push(sym);
            }
        } else {
            target.index = TargetIndex::Lexical(self.next_lexical);
            self.classified.push(ClassifiedSymbol::Lexical {
                symbol: sym,
                index: self.next_lexical,
            });
            self.lexical_count += 1;
            self.advance_lexical_index();
        }
    }

    /// Declared specials never seen as binding targets still get a
    /// classification entry (declaration bookkeeping, not binding).
    pub fn finish(mut self) -> ClassificationResult {
        for sym in &self.declared_special {
            if !self.locally_special.contains(sym) {
                self.classified.push(ClassifiedSymbol::Special(*sym));
            }
        }
        ClassificationResult {
            classified: self.classified,
            special_count: self.locally_special.len(),
            lexical_count: self.lexical_count,
        }
    }
}

// ---------------------------------------------------------------------
// Parsing

fn check_target_name(markers: &Markers, sym: SymbolId) -> Result<(), LambdaListError> {
    if sym == markers.sym_t {
        Err(LambdaListError::ReservedParameterName)
    } else {
        Ok(())
    }
}

fn require_symbol(
    value: TaggedValue,
    mode: ArgumentMode,
    what: &str,
) -> Result<SymbolId, LambdaListError> {
    value
        .as_symbol()
        .ok_or_else(|| LambdaListError::MalformedElement {
            mode,
            detail: format!("{} must be a symbol", what),
        })
}

fn destructuring_context(context: LambdaListContext) -> bool {
    matches!(
        context,
        LambdaListContext::Macro | LambdaListContext::DestructuringBind | LambdaListContext::Deftype
    )
}

/// The default default: NIL, except deftype parameters default to `'*`.
fn default_default(ctx: &mut RuntimeContext, context: LambdaListContext) -> TaggedValue {
    if context == LambdaListContext::Deftype {
        let star = TaggedValue::Symbol(ctx.markers.sym_star);
        let quote = TaggedValue::Symbol(ctx.markers.sym_quote);
        ctx.heap.list_from_slice(&[quote, star])
    } else {
        TaggedValue::Nil
    }
}

/// Parse a lambda list into an unclassified handler skeleton.
///
/// Returns a handler whose targets all carry TargetIndex::Undefined;
/// LambdaListHandler::build runs classification on top of this.
pub fn parse_lambda_list(
    ctx: &mut RuntimeContext,
    lambda_list: TaggedValue,
    context: LambdaListContext,
) -> Result<LambdaListHandler, LambdaListError> {
    let mut handler = LambdaListHandler::empty();
    if lambda_list.is_nil() {
        return Ok(handler);
    }
    if !ctx.heap.is_cons(lambda_list) {
        return Err(LambdaListError::MalformedLambdaList);
    }
    handler.creates_bindings = true;
    trace!("parsing lambda list in context {}", context);

    let dflt = default_default(ctx, context);
    let (elements, tail) = ctx.heap.list_parts(lambda_list);
    let mut mode = ArgumentMode::Required;

    let mut i = 0;
    while i < elements.len() {
        let element = elements[i];
        i += 1;

        if let Some(sym) = element.as_symbol() {
            let switched = switch_argument_mode(
                &ctx.markers,
                &ctx.symbols,
                context,
                sym,
                &mut mode,
                &mut handler.key_flag,
            )?;
            if switched {
                if mode == ArgumentMode::AllowOtherKeys {
                    handler.allow_other_keys = true;
                }
                continue;
            }
        }

        match mode {
            ArgumentMode::Required => {
                handler.push_required(ctx, element, context)?;
            }
            ArgumentMode::Optional => {
                handler.push_optional(ctx, element, dflt)?;
            }
            ArgumentMode::Rest | ArgumentMode::VaRest => {
                let sym = require_symbol(element, mode, "rest parameter")?;
                check_target_name(&ctx.markers, sym)?;
                handler.set_rest(ctx, sym, mode == ArgumentMode::VaRest)?;
            }
            ArgumentMode::DotRest => {
                if i < elements.len() {
                    return Err(LambdaListError::DotTailNotLast);
                }
                let sym = require_symbol(element, mode, "dotted-tail parameter")?;
                check_target_name(&ctx.markers, sym)?;
                handler.set_rest(ctx, sym, false)?;
            }
            ArgumentMode::Keyword => {
                handler.push_keyword(ctx, element, dflt)?;
            }
            ArgumentMode::AllowOtherKeys => {
                return Err(LambdaListError::MalformedElement {
                    mode,
                    detail: "no parameters may follow &allow-other-keys".to_string(),
                });
            }
            ArgumentMode::Aux => {
                handler.push_aux(ctx, element)?;
            }
        }
    }

    if mode == ArgumentMode::DotRest && handler.rest.is_none() {
        return Err(LambdaListError::MalformedElement {
            mode,
            detail: "dot must be followed by a parameter".to_string(),
        });
    }

    // A dotted list tail binds like an ordinary rest parameter.
    if !tail.is_nil() {
        let sym = require_symbol(tail, ArgumentMode::DotRest, "dotted-tail parameter")?;
        check_target_name(&ctx.markers, sym)?;
        handler.set_rest(ctx, sym, false)?;
    }

    Ok(handler)
}

/// Collect the names declared special in a declaration specifier list,
/// e.g. `((special *a* *b*) (type fixnum x))` yields `[*a*, *b*]`.
pub fn identify_special_symbols(ctx: &RuntimeContext, declares: TaggedValue) -> Vec<SymbolId> {
    let mut specials = Vec::new();
    let (decls, _) = ctx.heap.list_parts(declares);
    for decl in decls {
        let (parts, _) = ctx.heap.list_parts(decl);
        if parts.first().and_then(TaggedValue::as_symbol) == Some(ctx.markers.sym_special) {
            for part in &parts[1..] {
                if let Some(sym) = part.as_symbol() {
                    if !specials.contains(&sym) {
                        specials.push(sym);
                    }
                }
            }
        }
    }
    specials
}

/// Process a single-dispatch lambda list: exactly one required parameter
/// may be a `(symbol class-name)` pair naming the dispatch argument.
///
/// Returns the lambda list with the pair replaced by its symbol, the
/// dispatch symbol, the dispatch class (None when defaulted), and the
/// zero-based dispatch index.
pub fn process_single_dispatch_lambda_list(
    ctx: &mut RuntimeContext,
    lambda_list: TaggedValue,
    allow_first_argument_default: bool,
) -> Result<(TaggedValue, SymbolId, Option<SymbolId>, usize), LambdaListError> {
    let (mut elements, tail) = ctx.heap.list_parts(lambda_list);
    let mut dispatch: Option<(SymbolId, SymbolId, usize)> = None;

    for (idx, element) in elements.iter_mut().enumerate() {
        match element.as_symbol() {
            Some(sym) => {
                if marker_mode(&ctx.markers, sym)
                    .map(|m| m != ArgumentMode::DotRest)
                    .unwrap_or(false)
                {
                    break;
                }
            }
            None => {
                if !ctx.heap.is_cons(*element) {
                    return Err(LambdaListError::DispatchBadElement);
                }
                let pair = ctx
                    .heap
                    .list_to_vec(*element)
                    .ok_or(LambdaListError::DispatchBadElement)?;
                if pair.len() != 2 {
                    return Err(LambdaListError::DispatchPairArity { len: pair.len() });
                }
                if dispatch.is_some() {
                    return Err(LambdaListError::MultipleDispatchPairs);
                }
                let sym = pair[0]
                    .as_symbol()
                    .ok_or(LambdaListError::DispatchBadElement)?;
                let class_name = pair[1]
                    .as_symbol()
                    .ok_or(LambdaListError::DispatchBadElement)?;
                *element = TaggedValue::Symbol(sym);
                dispatch = Some((sym, class_name, idx));
            }
        }
    }

    let (sym, class_name, index) = match dispatch {
        Some((sym, class_name, index)) => (sym, Some(class_name), index),
        None => {
            if !allow_first_argument_default {
                return Err(LambdaListError::MissingDispatchArgument);
            }
            let first = elements
                .first()
                .and_then(TaggedValue::as_symbol)
                .ok_or(LambdaListError::MissingDispatchArgument)?;
            (first, None, 0)
        }
    };

    let mut rebuilt = tail;
    for element in elements.iter().rev() {
        rebuilt = ctx.heap.cons(*element, rebuilt);
    }
    Ok((rebuilt, sym, class_name, index))
}

/// Pull &whole and &environment out of a macro lambda list and prefix them
/// (gensymmed when absent) as required parameters, wrapping the remainder
/// behind a gensymmed macro-name slot:
/// `(whole env (name . remainder))`.
pub fn process_macro_lambda_list(
    ctx: &mut RuntimeContext,
    lambda_list: TaggedValue,
) -> Result<TaggedValue, LambdaListError> {
    let (mut elements, tail) = ctx.heap.list_parts(lambda_list);

    let mut whole = None;
    if elements.first().and_then(TaggedValue::as_symbol) == Some(ctx.markers.amp_whole) {
        if elements.len() < 2 {
            return Err(LambdaListError::MalformedElement {
                mode: ArgumentMode::Required,
                detail: "&whole must be followed by a symbol".to_string(),
            });
        }
        whole = Some(require_symbol(
            elements[1],
            ArgumentMode::Required,
            "&whole parameter",
        )?);
        elements.drain(..2);
    }

    let mut environment = None;
    if let Some(pos) = elements
        .iter()
        .position(|e| e.as_symbol() == Some(ctx.markers.amp_environment))
    {
        if pos + 1 >= elements.len() {
            return Err(LambdaListError::MalformedElement {
                mode: ArgumentMode::Required,
                detail: "&environment must be followed by a symbol".to_string(),
            });
        }
        environment = Some(require_symbol(
            elements[pos + 1],
            ArgumentMode::Required,
            "&environment parameter",
        )?);
        elements.drain(pos..pos + 2);
    }

    let whole = whole.unwrap_or_else(|| ctx.symbols.gensym("WHOLE"));
    let environment = environment.unwrap_or_else(|| ctx.symbols.gensym("ENVIRONMENT"));
    let name = ctx.symbols.gensym("MACRO-NAME");

    let mut remainder = tail;
    for element in elements.iter().rev() {
        remainder = ctx.heap.cons(*element, remainder);
    }
    let named = ctx.heap.cons(TaggedValue::Symbol(name), remainder);
    Ok(ctx.heap.list_from_slice(&[
        TaggedValue::Symbol(whole),
        TaggedValue::Symbol(environment),
        named,
    ]))
}

// ---------------------------------------------------------------------
// The handler

/// Parsed and classified lambda list, built once per function and shared
/// across all calls to it.
#[derive(Debug)]
pub struct LambdaListHandler {
    required: Vec<RequiredArgument>,
    optional: Vec<OptionalArgument>,
    rest: Option<RestArgument>,
    key_flag: bool,
    keyword: Vec<KeywordArgument>,
    allow_other_keys: bool,
    aux: Vec<AuxArgument>,
    creates_bindings: bool,
    dispatch: Option<DispatchInfo>,
    classified_symbols: Vec<ClassifiedSymbol>,
    number_of_special_variables: usize,
    number_of_lexical_variables: usize,
    required_lexicals_only: bool,
    lexical_names_cache: OnceLock<Vec<SymbolId>>,
}

impl LambdaListHandler {
    fn empty() -> Self {
        Self {
            required: Vec::new(),
            optional: Vec::new(),
            rest: None,
            key_flag: false,
            keyword: Vec::new(),
            allow_other_keys: false,
            aux: Vec::new(),
            creates_bindings: false,
            dispatch: None,
            classified_symbols: Vec::new(),
            number_of_special_variables: 0,
            number_of_lexical_variables: 0,
            required_lexicals_only: false,
            lexical_names_cache: OnceLock::new(),
        }
    }

    /// Parse and classify a lambda list. `declares` is a declaration
    /// specifier list; its `(special ...)` entries mark targets dynamic.
    pub fn build(
        ctx: &mut RuntimeContext,
        lambda_list: TaggedValue,
        declares: TaggedValue,
        context: LambdaListContext,
    ) -> Result<Self, LambdaListError> {
        Self::build_with_reserved(ctx, lambda_list, declares, context, &BTreeSet::new())
    }

    /// Like build, but lexical slot assignment skips `reserved` indices
    /// (slots pre-allocated by the caller, e.g. for dispatch arguments).
    pub fn build_with_reserved(
        ctx: &mut RuntimeContext,
        lambda_list: TaggedValue,
        declares: TaggedValue,
        context: LambdaListContext,
        reserved: &BTreeSet<usize>,
    ) -> Result<Self, LambdaListError> {
        let specials = identify_special_symbols(ctx, declares);
        let mut handler = parse_lambda_list(ctx, lambda_list, context)?;
        if handler.creates_bindings {
            let mut classifier = TargetClassifier::new(specials, reserved.clone());
            handler.classify_targets(&mut classifier, &ctx.symbols);
            let result = classifier.finish();
            handler.classified_symbols = result.classified;
            handler.number_of_special_variables = result.special_count;
            handler.number_of_lexical_variables = result.lexical_count;
        }
        handler.required_lexicals_only = handler.compute_required_lexicals_only();
        Ok(handler)
    }

    /// A handler of `num` gensymmed required parameters (fast path for
    /// callers that only know an arity).
    pub fn with_required_arguments(
        ctx: &mut RuntimeContext,
        num: usize,
        reserved: &BTreeSet<usize>,
    ) -> Self {
        let mut handler = Self::empty();
        handler.creates_bindings = num > 0;
        let mut classifier = TargetClassifier::new(Vec::new(), reserved.clone());
        for _ in 0..num {
            let sym = ctx.symbols.gensym("ARG");
            let mut target = Target::new(sym);
            classifier.classify_target(&mut target, &ctx.symbols);
            handler.required.push(RequiredArgument {
                target: RequiredTarget::Var(target),
            });
        }
        let result = classifier.finish();
        handler.classified_symbols = result.classified;
        handler.number_of_special_variables = result.special_count;
        handler.number_of_lexical_variables = result.lexical_count;
        handler.required_lexicals_only = handler.compute_required_lexicals_only();
        handler
    }

    // ---- parse helpers ----

    fn push_required(
        &mut self,
        ctx: &mut RuntimeContext,
        element: TaggedValue,
        context: LambdaListContext,
    ) -> Result<(), LambdaListError> {
        if let Some(sym) = element.as_symbol() {
            check_target_name(&ctx.markers, sym)?;
            self.required.push(RequiredArgument {
                target: RequiredTarget::Var(Target::new(sym)),
            });
            return Ok(());
        }
        if ctx.heap.is_cons(element) {
            if destructuring_context(context) {
                // recursive destructuring: the parameter is itself a
                // lambda list
                let sub = parse_lambda_list(ctx, element, context)?;
                self.required.push(RequiredArgument {
                    target: RequiredTarget::Destructure(Box::new(sub)),
                });
                return Ok(());
            }
            if context == LambdaListContext::Method {
                let pair = ctx
                    .heap
                    .list_to_vec(element)
                    .ok_or(LambdaListError::DispatchBadElement)?;
                if pair.len() != 2 {
                    return Err(LambdaListError::DispatchPairArity { len: pair.len() });
                }
                if self.dispatch.is_some() {
                    return Err(LambdaListError::MultipleDispatchPairs);
                }
                let sym = pair[0]
                    .as_symbol()
                    .ok_or(LambdaListError::DispatchBadElement)?;
                let class_name = pair[1]
                    .as_symbol()
                    .ok_or(LambdaListError::DispatchBadElement)?;
                check_target_name(&ctx.markers, sym)?;
                self.dispatch = Some(DispatchInfo {
                    symbol: sym,
                    class_name: Some(class_name),
                    index: self.required.len(),
                });
                self.required.push(RequiredArgument {
                    target: RequiredTarget::Var(Target::new(sym)),
                });
                return Ok(());
            }
        }
        Err(LambdaListError::MalformedElement {
            mode: ArgumentMode::Required,
            detail: "required parameter must be a symbol".to_string(),
        })
    }

    fn push_optional(
        &mut self,
        ctx: &mut RuntimeContext,
        element: TaggedValue,
        dflt: TaggedValue,
    ) -> Result<(), LambdaListError> {
        let (target, default, supplied_p) = if let Some(sym) = element.as_symbol() {
            (sym, dflt, None)
        } else {
            let parts = ctx.heap.list_to_vec(element).ok_or_else(|| {
                LambdaListError::MalformedElement {
                    mode: ArgumentMode::Optional,
                    detail: "optional parameter must be a symbol or a list".to_string(),
                }
            })?;
            if parts.is_empty() {
                return Err(LambdaListError::MalformedElement {
                    mode: ArgumentMode::Optional,
                    detail: "empty optional specification".to_string(),
                });
            }
            let sym = require_symbol(parts[0], ArgumentMode::Optional, "optional parameter")?;
            let default = parts.get(1).copied().unwrap_or(dflt);
            let supplied_p = match parts.get(2) {
                Some(s) => Some(require_symbol(
                    *s,
                    ArgumentMode::Optional,
                    "supplied-p variable",
                )?),
                None => None,
            };
            (sym, default, supplied_p)
        };
        check_target_name(&ctx.markers, target)?;
        self.optional.push(OptionalArgument {
            target: Target::new(target),
            default,
            supplied_p: supplied_p.map(Target::new),
        });
        Ok(())
    }

    fn set_rest(
        &mut self,
        ctx: &RuntimeContext,
        sym: SymbolId,
        va_rest: bool,
    ) -> Result<(), LambdaListError> {
        if let Some(existing) = &self.rest {
            return Err(LambdaListError::MultipleRest {
                existing: ctx
                    .symbols
                    .symbol_name(existing.target.symbol)
                    .unwrap_or("?")
                    .to_string(),
            });
        }
        self.rest = Some(RestArgument {
            target: Target::new(sym),
            va_rest,
        });
        Ok(())
    }

    fn push_keyword(
        &mut self,
        ctx: &mut RuntimeContext,
        element: TaggedValue,
        dflt: TaggedValue,
    ) -> Result<(), LambdaListError> {
        let (keyword, target, default, supplied_p) = if let Some(sym) = element.as_symbol() {
            (ctx.symbols.as_keyword(sym), sym, dflt, None)
        } else {
            let parts = ctx.heap.list_to_vec(element).ok_or_else(|| {
                LambdaListError::MalformedElement {
                    mode: ArgumentMode::Keyword,
                    detail: "keyword parameter must be a symbol or a list".to_string(),
                }
            })?;
            if parts.is_empty() {
                return Err(LambdaListError::MalformedElement {
                    mode: ArgumentMode::Keyword,
                    detail: "empty keyword specification".to_string(),
                });
            }
            // head is either `var` or `(keyword-name var)`
            let (keyword, target) = if let Some(sym) = parts[0].as_symbol() {
                (ctx.symbols.as_keyword(sym), sym)
            } else {
                let name_parts = ctx.heap.list_to_vec(parts[0]).ok_or_else(|| {
                    LambdaListError::MalformedElement {
                        mode: ArgumentMode::Keyword,
                        detail: "keyword name specification must be a list".to_string(),
                    }
                })?;
                if name_parts.len() != 2 {
                    return Err(LambdaListError::MalformedElement {
                        mode: ArgumentMode::Keyword,
                        detail: "keyword name specification must have two elements".to_string(),
                    });
                }
                let keyword =
                    require_symbol(name_parts[0], ArgumentMode::Keyword, "keyword name")?;
                let target =
                    require_symbol(name_parts[1], ArgumentMode::Keyword, "keyword parameter")?;
                (keyword, target)
            };
            let default = parts.get(1).copied().unwrap_or(dflt);
            let supplied_p = match parts.get(2) {
                Some(s) => Some(require_symbol(
                    *s,
                    ArgumentMode::Keyword,
                    "supplied-p variable",
                )?),
                None => None,
            };
            (keyword, target, default, supplied_p)
        };
        check_target_name(&ctx.markers, target)?;
        self.keyword.push(KeywordArgument {
            keyword,
            target: Target::new(target),
            default,
            supplied_p: supplied_p.map(Target::new),
        });
        Ok(())
    }

    fn push_aux(
        &mut self,
        ctx: &mut RuntimeContext,
        element: TaggedValue,
    ) -> Result<(), LambdaListError> {
        let (target, expression) = if let Some(sym) = element.as_symbol() {
            (sym, None)
        } else {
            let parts = ctx.heap.list_to_vec(element).ok_or_else(|| {
                LambdaListError::MalformedElement {
                    mode: ArgumentMode::Aux,
                    detail: "aux parameter must be a symbol or a list".to_string(),
                }
            })?;
            if parts.is_empty() {
                return Err(LambdaListError::MalformedElement {
                    mode: ArgumentMode::Aux,
                    detail: "empty aux specification".to_string(),
                });
            }
            let sym = require_symbol(parts[0], ArgumentMode::Aux, "aux parameter")?;
            (sym, parts.get(1).copied())
        };
        self.aux.push(AuxArgument {
            target: Target::new(target),
            expression,
        });
        Ok(())
    }

    // ---- classification ----

    /// Classify every target in binding order. Nested destructuring
    /// handlers share the same classifier so lexical indices stay
    /// contiguous across the whole tree.
    fn classify_targets(&mut self, classifier: &mut TargetClassifier, symbols: &SymbolTable) {
        for req in &mut self.required {
            match &mut req.target {
                RequiredTarget::Var(target) => classifier.classify_target(target, symbols),
                RequiredTarget::Destructure(sub) => sub.classify_targets(classifier, symbols),
            }
        }
        for opt in &mut self.optional {
            classifier.classify_target(&mut opt.target, symbols);
            if let Some(supplied) = &mut opt.supplied_p {
                classifier.classify_target(supplied, symbols);
            }
        }
        if let Some(rest) = &mut self.rest {
            classifier.classify_target(&mut rest.target, symbols);
        }
        for key in &mut self.keyword {
            classifier.classify_target(&mut key.target, symbols);
            if let Some(supplied) = &mut key.supplied_p {
                classifier.classify_target(supplied, symbols);
            }
        }
        for aux in &mut self.aux {
            classifier.classify_target(&mut aux.target, symbols);
        }
    }

    fn compute_required_lexicals_only(&self) -> bool {
        self.optional.is_empty()
            && self.rest.is_none()
            && self.keyword.is_empty()
            && !self.allow_other_keys
            && self.aux.is_empty()
            && self.required.iter().all(|req| match &req.target {
                RequiredTarget::Var(target) => target.is_lexical(),
                RequiredTarget::Destructure(_) => false,
            })
    }

    // ---- accessors ----

    pub fn creates_bindings(&self) -> bool {
        self.creates_bindings
    }

    pub fn required_arguments(&self) -> &[RequiredArgument] {
        &self.required
    }

    pub fn optional_arguments(&self) -> &[OptionalArgument] {
        &self.optional
    }

    pub fn rest_argument(&self) -> Option<&RestArgument> {
        self.rest.as_ref()
    }

    pub fn keyword_arguments(&self) -> &[KeywordArgument] {
        &self.keyword
    }

    pub fn aux_arguments(&self) -> &[AuxArgument] {
        &self.aux
    }

    /// True if &key appeared, even with zero keyword parameters.
    pub fn key_flag(&self) -> bool {
        self.key_flag
    }

    pub fn allow_other_keys(&self) -> bool {
        self.allow_other_keys
    }

    pub fn dispatch_info(&self) -> Option<&DispatchInfo> {
        self.dispatch.as_ref()
    }

    pub fn number_of_required_arguments(&self) -> usize {
        self.required.len()
    }

    /// Minimum and maximum accepted argument counts; max is None with a
    /// rest or keyword sink.
    pub fn arity(&self) -> (usize, Option<usize>) {
        let min = self.required.len();
        let max = if self.rest.is_some() || self.key_flag || !self.keyword.is_empty() {
            None
        } else {
            Some(min + self.optional.len())
        };
        (min, max)
    }

    /// Number of lexical frame slots a caller must size its StackFrame to.
    pub fn number_of_lexical_variables(&self) -> usize {
        self.number_of_lexical_variables
    }

    pub fn number_of_special_variables(&self) -> usize {
        self.number_of_special_variables
    }

    pub fn required_lexicals_only(&self) -> bool {
        self.required_lexicals_only
    }

    pub fn classified_symbols(&self) -> &[ClassifiedSymbol] {
        &self.classified_symbols
    }

    pub fn names_of_lexical_variables(&self) -> Vec<SymbolId> {
        self.classified_symbols
            .iter()
            .filter_map(|c| match c {
                ClassifiedSymbol::Lexical { symbol, .. } => Some(*symbol),
                ClassifiedSymbol::Special(_) => None,
            })
            .collect()
    }

    pub fn special_variables(&self) -> Vec<SymbolId> {
        self.classified_symbols
            .iter()
            .filter_map(|c| match c {
                ClassifiedSymbol::Special(symbol) => Some(*symbol),
                ClassifiedSymbol::Lexical { .. } => None,
            })
            .collect()
    }

    /// Lexical names in slot order, computed once on first use.
    pub fn lexical_variable_names_for_debugging(&self) -> &[SymbolId] {
        self.lexical_names_cache
            .get_or_init(|| self.names_of_lexical_variables())
    }

    /// Gensym supplied-p variables for optional and keyword parameters
    /// that lack them. The fresh targets are left unclassified; callers
    /// re-resolve storage themselves.
    pub fn add_missing_supplied_p(&mut self, symbols: &mut SymbolTable) {
        for opt in &mut self.optional {
            if opt.supplied_p.is_none() {
                opt.supplied_p = Some(Target::new(symbols.gensym("SUPPLIED-P")));
            }
        }
        for key in &mut self.keyword {
            if key.supplied_p.is_none() {
                key.supplied_p = Some(Target::new(symbols.gensym("SUPPLIED-P")));
            }
        }
    }

    /// Frame index of the required parameter named `target` (used by
    /// single-dispatch generic functions).
    pub fn single_dispatch_on_argument(
        &self,
        ctx: &RuntimeContext,
        target: SymbolId,
    ) -> Result<usize, LambdaListError> {
        for req in &self.required {
            if let RequiredTarget::Var(t) = &req.target {
                if t.symbol == target {
                    if let TargetIndex::Lexical(idx) = t.index {
                        return Ok(idx);
                    }
                }
            }
        }
        Err(LambdaListError::UnknownDispatchTarget {
            name: ctx.symbols.symbol_name(target).unwrap_or("?").to_string(),
        })
    }

    /// Reconstruct the lambda list as an s-expression (describe/debugging).
    pub fn reconstructed_lambda_list(&self, ctx: &mut RuntimeContext) -> TaggedValue {
        let mut elements: Vec<TaggedValue> = Vec::new();
        for req in &self.required {
            match &req.target {
                RequiredTarget::Var(target) => {
                    elements.push(TaggedValue::Symbol(target.symbol));
                }
                RequiredTarget::Destructure(sub) => {
                    elements.push(sub.reconstructed_lambda_list(ctx));
                }
            }
        }
        if !self.optional.is_empty() {
            elements.push(TaggedValue::Symbol(ctx.markers.amp_optional));
            for opt in &self.optional {
                elements.push(reconstruct_entry(
                    ctx,
                    TaggedValue::Symbol(opt.target.symbol),
                    opt.default,
                    opt.supplied_p.as_ref(),
                ));
            }
        }
        if let Some(rest) = &self.rest {
            let marker = if rest.va_rest {
                ctx.markers.amp_va_rest
            } else {
                ctx.markers.amp_rest
            };
            elements.push(TaggedValue::Symbol(marker));
            elements.push(TaggedValue::Symbol(rest.target.symbol));
        }
        if self.key_flag || !self.keyword.is_empty() {
            elements.push(TaggedValue::Symbol(ctx.markers.amp_key));
            for key in &self.keyword {
                let names_match = ctx.symbols.symbol_name(key.keyword)
                    == ctx.symbols.symbol_name(key.target.symbol);
                let head = if names_match {
                    TaggedValue::Symbol(key.target.symbol)
                } else {
                    ctx.heap.list_from_slice(&[
                        TaggedValue::Symbol(key.keyword),
                        TaggedValue::Symbol(key.target.symbol),
                    ])
                };
                elements.push(reconstruct_entry(ctx, head, key.default, key.supplied_p.as_ref()));
            }
        }
        if self.allow_other_keys {
            elements.push(TaggedValue::Symbol(ctx.markers.amp_allow_other_keys));
        }
        if !self.aux.is_empty() {
            elements.push(TaggedValue::Symbol(ctx.markers.amp_aux));
            for aux in &self.aux {
                let expr = aux.expression.unwrap_or(TaggedValue::Nil);
                let entry = ctx
                    .heap
                    .list_from_slice(&[TaggedValue::Symbol(aux.target.symbol), expr]);
                elements.push(entry);
            }
        }
        ctx.heap.list_from_slice(&elements)
    }
}

fn reconstruct_entry(
    ctx: &mut RuntimeContext,
    head: TaggedValue,
    default: TaggedValue,
    supplied_p: Option<&Target>,
) -> TaggedValue {
    match supplied_p {
        Some(supplied) => ctx
            .heap
            .list_from_slice(&[head, default, TaggedValue::Symbol(supplied.symbol)]),
        None if !default.is_nil() => ctx.heap.list_from_slice(&[head, default]),
        None => head,
    }
}
