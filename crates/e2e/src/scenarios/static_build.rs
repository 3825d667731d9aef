//! One-shot production builds

use cssbuild_common::syntax::{css, html, javascript};

use super::{CONFIG_JS, CONFIG_TS, OUTPUT_CSS};
use crate::error::E2eResult;
use crate::integration::Integration;

const BUILD: &str = "webpack --mode=production";

const TAILWIND_DIRECTIVES: &str = r#"
    @tailwind base;
    @tailwind components;
    @tailwind utilities;
"#;

/// `bg-primary` with `primary: 'black'`
fn bg_primary(ctx: &Integration) -> String {
    css(ctx.mode().pick(
        r#"
        .bg-primary {
          --tw-bg-opacity: 1;
          background-color: rgb(0 0 0 / var(--tw-bg-opacity));
        }
        "#,
        r#"
        .bg-primary {
          background-color: black;
        }
        "#,
    ))
}

pub async fn generates_output(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.html", &html(r#"<div class="font-bold"></div>"#))
        .await?;

    ctx.run(BUILD).await?;

    ctx.expect_output_css(
        OUTPUT_CSS,
        &css(
            r#"
            .font-bold {
              font-weight: 700;
            }
            "#,
        ),
    )
    .await
}

pub async fn esm_config(ctx: &Integration) -> E2eResult<()> {
    ctx.remove_file(CONFIG_JS).await?;
    ctx.write_input_file("index.html", &html(r#"<div class="bg-primary"></div>"#))
        .await?;
    ctx.write_input_file("index.css", &css(TAILWIND_DIRECTIVES)).await?;
    ctx.write_input_file(
        CONFIG_JS,
        &javascript(
            r#"
            export default {
              content: ['./src/index.html'],
              theme: {
                extend: {
                  colors: {
                    primary: 'black',
                  },
                },
              },
              corePlugins: {
                preflight: false,
              },
            }
            "#,
        ),
    )
    .await?;

    ctx.run(BUILD).await?;

    ctx.expect_output_css(OUTPUT_CSS, &bg_primary(ctx)).await
}

pub async fn typescript_config(ctx: &Integration) -> E2eResult<()> {
    ctx.remove_file(CONFIG_JS).await?;
    ctx.write_input_file("index.html", &html(r#"<div class="bg-primary"></div>"#))
        .await?;
    ctx.write_input_file("index.css", &css(TAILWIND_DIRECTIVES)).await?;
    ctx.write_input_file(
        CONFIG_TS,
        &javascript(
            r#"
            import type { Config } from 'tailwindcss'

            export default {
              content: ['./src/index.html'],
              theme: {
                extend: {
                  colors: {
                    primary: 'black',
                  },
                },
              },
              corePlugins: {
                preflight: false,
              },
            } satisfies Config
            "#,
        ),
    )
    .await?;

    ctx.run(BUILD).await?;

    ctx.expect_output_css(OUTPUT_CSS, &bg_primary(ctx)).await
}
