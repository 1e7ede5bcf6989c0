/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test on a dedicated multi-threaded tokio runtime.
///
/// The body executes inside an `info` span named after the test. Panics raised on
/// the runtime's worker threads (spawned tasks, detached handlers) are recorded and
/// re-raised once the body has finished, so they fail the test instead of vanishing
/// inside a `JoinHandle`.
#[proc_macro_attribute]
pub fn homelink_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(input.sig.fn_token, "#[homelink_test] requires an async fn")
            .to_compile_error()
            .into();
    }

    let vis = &input.vis;
    let attrs = &input.attrs;
    let body = &input.block;
    let name = &input.sig.ident;
    let inputs = &input.sig.inputs;
    let output = &input.sig.output;
    let async_name = format_ident!("__{}_async", name);

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            let watch = ::homelink_test::PanicWatch::new(concat!(module_path!(), "::", stringify!(#name)));
            let runtime = watch
                .runtime()
                .expect("failed to build the homelink_test runtime");

            let result = runtime.block_on(::homelink_test::__private::tracing::Instrument::instrument(
                #async_name(),
                ::homelink_test::__private::tracing::info_span!("homelink_test", name = stringify!(#name)),
            ));

            drop(runtime);
            watch.finish();
            result
        }

        async fn #async_name(#inputs) #output #body
    };

    expanded.into()
}
