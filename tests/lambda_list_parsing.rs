// Lambdacore lambda-list parsing and classification tests

use std::collections::BTreeSet;

use lambdacore::conditions::LambdaListError;
use lambdacore::context::RuntimeContext;
use lambdacore::lambda_list::{
    process_macro_lambda_list, process_single_dispatch_lambda_list, ClassifiedSymbol,
    LambdaListContext, LambdaListHandler, TargetIndex,
};
use lambdacore::types::TaggedValue;

fn ctx() -> RuntimeContext {
    RuntimeContext::new()
}

fn s(ctx: &mut RuntimeContext, name: &str) -> TaggedValue {
    TaggedValue::Symbol(ctx.symbols.intern(name))
}

fn list(ctx: &mut RuntimeContext, items: &[TaggedValue]) -> TaggedValue {
    ctx.heap.list_from_slice(items)
}

fn build(
    ctx: &mut RuntimeContext,
    ll: TaggedValue,
    context: LambdaListContext,
) -> Result<LambdaListHandler, LambdaListError> {
    LambdaListHandler::build(ctx, ll, TaggedValue::Nil, context)
}

#[test]
fn test_duplicate_optional_marker_rejected() {
    let mut ctx = ctx();
    let items = [
        s(&mut ctx, "A"),
        s(&mut ctx, "&OPTIONAL"),
        s(&mut ctx, "B"),
        s(&mut ctx, "&OPTIONAL"),
        s(&mut ctx, "C"),
    ];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::Function).unwrap_err();
    assert!(matches!(err, LambdaListError::IllegalMarker { .. }));
}

#[test]
fn test_no_markers_after_aux() {
    let mut ctx = ctx();
    let items = [
        s(&mut ctx, "&AUX"),
        s(&mut ctx, "A"),
        s(&mut ctx, "&REST"),
        s(&mut ctx, "R"),
    ];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::Function).unwrap_err();
    assert!(matches!(err, LambdaListError::IllegalMarker { .. }));
}

#[test]
fn test_allow_other_keys_requires_key_section() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "&ALLOW-OTHER-KEYS")];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::Function).unwrap_err();
    assert!(matches!(err, LambdaListError::IllegalMarker { .. }));
}

#[test]
fn test_key_illegal_in_define_modify_macro() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "&KEY"), s(&mut ctx, "K")];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::DefineModifyMacro).unwrap_err();
    assert!(matches!(
        err,
        LambdaListError::IllegalModeForContext { .. }
    ));
}

#[test]
fn test_aux_illegal_in_defsetf_and_generic_function() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "&AUX"), s(&mut ctx, "X")];
    let ll = list(&mut ctx, &items);
    for context in [
        LambdaListContext::Defsetf,
        LambdaListContext::GenericFunction,
    ] {
        let err = build(&mut ctx, ll, context).unwrap_err();
        assert!(matches!(
            err,
            LambdaListError::IllegalModeForContext { .. }
        ));
    }
}

#[test]
fn test_dot_marker_restricted_to_destructuring_contexts() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "."), s(&mut ctx, "R")];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::Function).unwrap_err();
    assert!(matches!(
        err,
        LambdaListError::IllegalModeForContext { .. }
    ));
    let handler = build(&mut ctx, ll, LambdaListContext::DestructuringBind).unwrap();
    let rest = handler.rest_argument().unwrap();
    assert_eq!(
        ctx.symbols.symbol_name(rest.target.symbol).unwrap(),
        "R"
    );
}

#[test]
fn test_dot_followed_by_more_than_one_element() {
    let mut ctx = ctx();
    let items = [
        s(&mut ctx, "A"),
        s(&mut ctx, "."),
        s(&mut ctx, "R"),
        s(&mut ctx, "EXTRA"),
    ];
    let ll = list(&mut ctx, &items);
    let err = build(&mut ctx, ll, LambdaListContext::Macro).unwrap_err();
    assert_eq!(err, LambdaListError::DotTailNotLast);
}

#[test]
fn test_every_target_classified_exactly_once() {
    let mut ctx = ctx();
    let star_b = ctx.symbols.intern("*B*");
    let star_d = ctx.symbols.intern("*D*");
    let a = ctx.symbols.intern("A");
    let c = ctx.symbols.intern("C");
    let ll = {
        let items = [
            TaggedValue::Symbol(a),
            TaggedValue::Symbol(star_b),
            TaggedValue::Symbol(c),
        ];
        list(&mut ctx, &items)
    };
    let declares = {
        let special = s(&mut ctx, "SPECIAL");
        let decl = list(
            &mut ctx,
            &[special, TaggedValue::Symbol(star_b), TaggedValue::Symbol(star_d)],
        );
        list(&mut ctx, &[decl])
    };
    let handler =
        LambdaListHandler::build(&mut ctx, ll, declares, LambdaListContext::Function).unwrap();
    assert_eq!(
        handler.classified_symbols(),
        &[
            ClassifiedSymbol::Lexical { symbol: a, index: 0 },
            ClassifiedSymbol::Special(star_b),
            ClassifiedSymbol::Lexical { symbol: c, index: 1 },
            // declared special that never appears as a target
            ClassifiedSymbol::Special(star_d),
        ]
    );
    assert_eq!(handler.number_of_lexical_variables(), 2);
    assert_eq!(handler.number_of_special_variables(), 1);
    assert_eq!(handler.names_of_lexical_variables(), vec![a, c]);
    assert!(!handler.required_lexicals_only());
}

#[test]
fn test_globally_proclaimed_special_classifies_special() {
    let mut ctx = ctx();
    let star_p = ctx.symbols.intern("*PRINT-BASE*");
    ctx.symbols.proclaim_special(star_p);
    let ll = list(&mut ctx, &[TaggedValue::Symbol(star_p)]);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert_eq!(
        handler.classified_symbols(),
        &[ClassifiedSymbol::Special(star_p)]
    );
    assert_eq!(handler.number_of_lexical_variables(), 0);
}

#[test]
fn test_reserved_frame_indices_are_skipped() {
    let mut ctx = ctx();
    let a = ctx.symbols.intern("A");
    let b = ctx.symbols.intern("B");
    let ll = list(&mut ctx, &[TaggedValue::Symbol(a), TaggedValue::Symbol(b)]);
    let reserved: BTreeSet<usize> = [0].into_iter().collect();
    let handler = LambdaListHandler::build_with_reserved(
        &mut ctx,
        ll,
        TaggedValue::Nil,
        LambdaListContext::Function,
        &reserved,
    )
    .unwrap();
    assert_eq!(
        handler.classified_symbols(),
        &[
            ClassifiedSymbol::Lexical { symbol: a, index: 1 },
            ClassifiedSymbol::Lexical { symbol: b, index: 2 },
        ]
    );
}

#[test]
fn test_decoupled_keyword_name() {
    let mut ctx = ctx();
    let size_kw = ctx.symbols.intern_keyword("SIZE");
    let n = ctx.symbols.intern("N");
    let size_p = ctx.symbols.intern("SIZE-P");
    let name_pair = list(&mut ctx, &[TaggedValue::Symbol(size_kw), TaggedValue::Symbol(n)]);
    let spec = list(
        &mut ctx,
        &[name_pair, TaggedValue::Fixnum(10), TaggedValue::Symbol(size_p)],
    );
    let amp_key = s(&mut ctx, "&KEY");
    let ll = list(&mut ctx, &[amp_key, spec]);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    let key = &handler.keyword_arguments()[0];
    assert_eq!(key.keyword, size_kw);
    assert_eq!(key.target.symbol, n);
    assert_eq!(key.default, TaggedValue::Fixnum(10));
    assert_eq!(key.supplied_p.as_ref().unwrap().symbol, size_p);
}

#[test]
fn test_plain_keyword_parameter_interns_keyword_name() {
    let mut ctx = ctx();
    let amp_key = s(&mut ctx, "&KEY");
    let count = ctx.symbols.intern("COUNT");
    let ll = list(&mut ctx, &[amp_key, TaggedValue::Symbol(count)]);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    let key = &handler.keyword_arguments()[0];
    assert_eq!(key.keyword, ctx.symbols.intern_keyword("COUNT"));
    assert_eq!(key.target.symbol, count);
    assert_eq!(key.default, TaggedValue::Nil);
    assert!(key.supplied_p.is_none());
}

#[test]
fn test_arity_window() {
    let mut ctx = ctx();
    let items = [
        s(&mut ctx, "A"),
        s(&mut ctx, "&OPTIONAL"),
        s(&mut ctx, "B"),
    ];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert_eq!(handler.arity(), (1, Some(2)));

    let items = [s(&mut ctx, "A"), s(&mut ctx, "&REST"), s(&mut ctx, "R")];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert_eq!(handler.arity(), (1, None));
}

#[test]
fn test_method_dispatch_pair() {
    let mut ctx = ctx();
    let x = ctx.symbols.intern("X");
    let integer = ctx.symbols.intern("INTEGER");
    let pair = list(&mut ctx, &[TaggedValue::Symbol(x), TaggedValue::Symbol(integer)]);
    let y = s(&mut ctx, "Y");
    let ll = list(&mut ctx, &[pair, y]);
    let handler = build(&mut ctx, ll, LambdaListContext::Method).unwrap();
    let dispatch = handler.dispatch_info().unwrap();
    assert_eq!(dispatch.symbol, x);
    assert_eq!(dispatch.class_name, Some(integer));
    assert_eq!(dispatch.index, 0);
    assert_eq!(handler.single_dispatch_on_argument(&ctx, x).unwrap(), 0);
}

#[test]
fn test_single_dispatch_processing() {
    let mut ctx = ctx();
    let x = ctx.symbols.intern("X");
    let integer = ctx.symbols.intern("INTEGER");
    let pair = list(&mut ctx, &[TaggedValue::Symbol(x), TaggedValue::Symbol(integer)]);
    let y = s(&mut ctx, "Y");
    let ll = list(&mut ctx, &[y, pair]);
    let (rebuilt, sym, class_name, index) =
        process_single_dispatch_lambda_list(&mut ctx, ll, false).unwrap();
    assert_eq!(sym, x);
    assert_eq!(class_name, Some(integer));
    assert_eq!(index, 1);
    // the pair is replaced by its symbol in the returned lambda list
    let parts = ctx.heap.list_to_vec(rebuilt).unwrap();
    assert_eq!(parts, vec![y, TaggedValue::Symbol(x)]);
}

#[test]
fn test_single_dispatch_errors() {
    let mut ctx = ctx();
    let x = ctx.symbols.intern("X");
    let integer = ctx.symbols.intern("INTEGER");
    let extra = s(&mut ctx, "EXTRA");
    let triple = list(
        &mut ctx,
        &[TaggedValue::Symbol(x), TaggedValue::Symbol(integer), extra],
    );
    let ll = list(&mut ctx, &[triple]);
    assert_eq!(
        process_single_dispatch_lambda_list(&mut ctx, ll, false).unwrap_err(),
        LambdaListError::DispatchPairArity { len: 3 }
    );

    let pair_a = list(&mut ctx, &[TaggedValue::Symbol(x), TaggedValue::Symbol(integer)]);
    let pair_b = list(&mut ctx, &[TaggedValue::Symbol(x), TaggedValue::Symbol(integer)]);
    let ll = list(&mut ctx, &[pair_a, pair_b]);
    assert_eq!(
        process_single_dispatch_lambda_list(&mut ctx, ll, false).unwrap_err(),
        LambdaListError::MultipleDispatchPairs
    );

    let y = s(&mut ctx, "Y");
    let ll = list(&mut ctx, &[y]);
    assert_eq!(
        process_single_dispatch_lambda_list(&mut ctx, ll, false).unwrap_err(),
        LambdaListError::MissingDispatchArgument
    );
    // with first-argument defaulting the bare symbol dispatches untyped
    let (_, sym, class_name, index) =
        process_single_dispatch_lambda_list(&mut ctx, ll, true).unwrap();
    assert_eq!(TaggedValue::Symbol(sym), y);
    assert_eq!(class_name, None);
    assert_eq!(index, 0);
}

#[test]
fn test_macro_lambda_list_extracts_whole_and_environment() {
    let mut ctx = ctx();
    let w = ctx.symbols.intern("W");
    let e = ctx.symbols.intern("E");
    let items = [
        s(&mut ctx, "&WHOLE"),
        TaggedValue::Symbol(w),
        s(&mut ctx, "A"),
        s(&mut ctx, "&ENVIRONMENT"),
        TaggedValue::Symbol(e),
        s(&mut ctx, "B"),
    ];
    let ll = list(&mut ctx, &items);
    let result = process_macro_lambda_list(&mut ctx, ll).unwrap();
    let parts = ctx.heap.list_to_vec(result).unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], TaggedValue::Symbol(w));
    assert_eq!(parts[1], TaggedValue::Symbol(e));
    // third element is (gensymmed-name a b)
    let inner = ctx.heap.list_to_vec(parts[2]).unwrap();
    assert_eq!(inner.len(), 3);
    let name = inner[0].as_symbol().unwrap();
    assert!(ctx.symbols.get_symbol(name).unwrap().package.is_none());
    let a = s(&mut ctx, "A");
    let b = s(&mut ctx, "B");
    assert_eq!(&inner[1..], &[a, b]);
}

#[test]
fn test_macro_lambda_list_gensyms_missing_parts() {
    let mut ctx = ctx();
    let a = s(&mut ctx, "A");
    let ll = list(&mut ctx, &[a]);
    let result = process_macro_lambda_list(&mut ctx, ll).unwrap();
    let parts = ctx.heap.list_to_vec(result).unwrap();
    assert_eq!(parts.len(), 3);
    for value in &parts[..2] {
        let sym = value.as_symbol().unwrap();
        assert!(ctx.symbols.get_symbol(sym).unwrap().package.is_none());
    }
}

#[test]
fn test_add_missing_supplied_p() {
    let mut ctx = ctx();
    let items = [
        s(&mut ctx, "&OPTIONAL"),
        s(&mut ctx, "A"),
        s(&mut ctx, "&KEY"),
        s(&mut ctx, "K"),
    ];
    let ll = list(&mut ctx, &items);
    let mut handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert!(handler.optional_arguments()[0].supplied_p.is_none());
    handler.add_missing_supplied_p(&mut ctx.symbols);
    let opt = &handler.optional_arguments()[0];
    let supplied = opt.supplied_p.as_ref().unwrap();
    assert_eq!(supplied.index, TargetIndex::Undefined);
    assert!(ctx
        .symbols
        .get_symbol(supplied.symbol)
        .unwrap()
        .package
        .is_none());
    assert!(handler.keyword_arguments()[0].supplied_p.is_some());
}

#[test]
fn test_reconstructed_lambda_list() {
    let mut ctx = ctx();
    let b_spec = {
        let b = s(&mut ctx, "B");
        list(&mut ctx, &[b, TaggedValue::Fixnum(5)])
    };
    let items = [
        s(&mut ctx, "A"),
        s(&mut ctx, "&OPTIONAL"),
        b_spec,
        s(&mut ctx, "&REST"),
        s(&mut ctx, "R"),
        s(&mut ctx, "&KEY"),
        s(&mut ctx, "K"),
        s(&mut ctx, "&ALLOW-OTHER-KEYS"),
    ];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    let rebuilt = handler.reconstructed_lambda_list(&mut ctx);
    let parts = ctx.heap.list_to_vec(rebuilt).unwrap();
    assert_eq!(parts[0], s(&mut ctx, "A"));
    assert_eq!(parts[1], s(&mut ctx, "&OPTIONAL"));
    let b_parts = ctx.heap.list_to_vec(parts[2]).unwrap();
    assert_eq!(b_parts[0], s(&mut ctx, "B"));
    assert_eq!(b_parts[1], TaggedValue::Fixnum(5));
    assert_eq!(parts[3], s(&mut ctx, "&REST"));
    assert_eq!(parts[4], s(&mut ctx, "R"));
    assert_eq!(parts[5], s(&mut ctx, "&KEY"));
    assert_eq!(parts[6], s(&mut ctx, "K"));
    assert_eq!(parts[7], s(&mut ctx, "&ALLOW-OTHER-KEYS"));
}

#[test]
fn test_required_lexicals_only_fast_path_flag() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "B")];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert!(handler.required_lexicals_only());

    let items = [s(&mut ctx, "A"), s(&mut ctx, "&OPTIONAL"), s(&mut ctx, "B")];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert!(!handler.required_lexicals_only());
}

#[test]
fn test_nested_destructuring_shares_frame_indices() {
    let mut ctx = ctx();
    let a = ctx.symbols.intern("A");
    let b = ctx.symbols.intern("B");
    let c = ctx.symbols.intern("C");
    let inner = list(&mut ctx, &[TaggedValue::Symbol(b), TaggedValue::Symbol(c)]);
    let ll = list(&mut ctx, &[TaggedValue::Symbol(a), inner]);
    let handler = build(&mut ctx, ll, LambdaListContext::DestructuringBind).unwrap();
    assert_eq!(
        handler.classified_symbols(),
        &[
            ClassifiedSymbol::Lexical { symbol: a, index: 0 },
            ClassifiedSymbol::Lexical { symbol: b, index: 1 },
            ClassifiedSymbol::Lexical { symbol: c, index: 2 },
        ]
    );
    assert_eq!(handler.number_of_lexical_variables(), 3);
}

#[test]
fn test_va_rest_marker() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "&VA-REST"), s(&mut ctx, "R")];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Function).unwrap();
    assert!(handler.rest_argument().unwrap().va_rest);
}

#[test]
fn test_body_is_an_alias_for_rest() {
    let mut ctx = ctx();
    let items = [s(&mut ctx, "A"), s(&mut ctx, "&BODY"), s(&mut ctx, "FORMS")];
    let ll = list(&mut ctx, &items);
    let handler = build(&mut ctx, ll, LambdaListContext::Macro).unwrap();
    let rest = handler.rest_argument().unwrap();
    assert!(!rest.va_rest);
    assert_eq!(ctx.symbols.symbol_name(rest.target.symbol).unwrap(), "FORMS");
}
