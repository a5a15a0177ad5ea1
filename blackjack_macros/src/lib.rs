use proc_macro::TokenStream as TokenStream1;
use quote::ToTokens;
use syn::{self, parse_quote};

/// This macro is added before a method of the `Table` struct in the impl block.
/// Use this macro to first check if the current round phase is exactly the phase
/// in the attribute.
///
/// For example, `#[allowed_phase(PlayerTurn)]` will make a method first check
/// if the current round phase is `PlayerTurn`. If not, the method returns
/// `GameError::WrongPhase` naming the method, the expected phase and the actual
/// one. Both `RoundPhase` and `GameError` must be in scope where the method is
/// defined, and the method must return `Result<_, GameError>`.
#[proc_macro_attribute]
pub fn allowed_phase(attr: TokenStream1, item: TokenStream1) -> TokenStream1 {
    let mut ast: syn::ImplItemFn =
        syn::parse(item).expect("allowed_phase can only be put on a method");
    let phase: syn::Ident =
        syn::parse(attr).expect("allowed_phase expects exactly one phase name");
    let operation = ast.sig.ident.to_string();

    let early_return: syn::Stmt = parse_quote! {
        if self.current_phase != RoundPhase::#phase {
            return Err(GameError::WrongPhase {
                operation: #operation,
                expected: RoundPhase::#phase,
                actual: self.current_phase,
            });
        }
    };
    ast.block.stmts.insert(0, early_return);
    ast.into_token_stream().into()
}
