//! Watch-mode builds reacting to source edits

use cssbuild_common::syntax::{css, html, javascript};

use super::{CONFIG_JS, OUTPUT_CSS};
use crate::error::E2eResult;
use crate::integration::Integration;

const WATCH: &str = "webpack --mode=development --watch";

const FONT_BOLD: &str = r#"
    .font-bold {
      font-weight: 700;
    }
"#;

const FONT_BOLD_AND_NORMAL: &str = r#"
    .font-bold {
      font-weight: 700;
    }
    .font-normal {
      font-weight: 400;
    }
"#;

fn with_bg_red(ctx: &Integration) -> String {
    css(ctx.mode().pick(
        r#"
        .bg-red-500 {
          --tw-bg-opacity: 1;
          background-color: rgb(239 68 68 / var(--tw-bg-opacity));
        }
        .font-bold {
          font-weight: 700;
        }
        .font-normal {
          font-weight: 400;
        }
        "#,
        r#"
        .bg-red-500 {
          background-color: #ef4444;
        }
        .font-bold {
          font-weight: 700;
        }
        .font-normal {
          font-weight: 400;
        }
        "#,
    ))
}

pub async fn html_changes(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.html", &html(r#"<div class="font-bold"></div>"#))
        .await?;

    let mut process = ctx.spawn(WATCH)?;

    ctx.wait_for_output_file_creation(OUTPUT_CSS).await?;
    ctx.expect_output_css(OUTPUT_CSS, &css(FONT_BOLD)).await?;

    let normal = html(r#"<div class="font-normal"></div>"#);
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.append_to_input_file("index.html", &normal))
        .await?;
    ctx.expect_output_css(OUTPUT_CSS, &css(FONT_BOLD_AND_NORMAL)).await?;

    let red = html(r#"<div class="bg-red-500"></div>"#);
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.append_to_input_file("index.html", &red))
        .await?;
    ctx.expect_output_css(OUTPUT_CSS, &with_bg_red(ctx)).await?;

    process.stop().await?;
    Ok(())
}

pub async fn globbed_files(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("glob/index.html", &html(r#"<div class="font-bold"></div>"#))
        .await?;

    let mut process = ctx.spawn(WATCH)?;

    ctx.wait_for_output_file_creation(OUTPUT_CSS).await?;
    ctx.expect_output_css(OUTPUT_CSS, &css(FONT_BOLD)).await?;

    let normal = html(r#"<div class="font-normal"></div>"#);
    ctx.wait_for_output_file_change(OUTPUT_CSS, || {
        ctx.append_to_input_file("glob/index.html", &normal)
    })
    .await?;
    ctx.expect_output_css(OUTPUT_CSS, &css(FONT_BOLD_AND_NORMAL)).await?;

    // The top-level page is content too.
    let red = html(r#"<div class="bg-red-500"></div>"#);
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.append_to_input_file("index.html", &red))
        .await?;
    ctx.expect_output_css(OUTPUT_CSS, &with_bg_red(ctx)).await?;

    process.stop().await?;
    Ok(())
}

pub async fn config_changes(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file(
        "index.html",
        &html(r#"<div class="font-bold md:font-medium"></div>"#),
    )
    .await?;

    let mut process = ctx.spawn(WATCH)?;

    ctx.wait_for_output_file_creation(OUTPUT_CSS).await?;
    ctx.expect_output_css(
        OUTPUT_CSS,
        &css(
            r#"
            .font-bold {
              font-weight: 700;
            }
            @media (min-width: 768px) {
              .md\:font-medium {
                font-weight: 500;
              }
            }
            "#,
        ),
    )
    .await?;

    let config = javascript(
        r#"
        module.exports = {
          content: ['./src/index.html'],
          theme: {
            extend: {
              screens: {
                md: '800px'
              },
              fontWeight: {
                bold: 'bold'
              }
            },
          },
          corePlugins: {
            preflight: false,
          },
          plugins: [],
        }
        "#,
    );
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.write_input_file(CONFIG_JS, &config))
        .await?;
    ctx.expect_output_css(
        OUTPUT_CSS,
        &css(
            r#"
            .font-bold {
              font-weight: bold;
            }
            @media (min-width: 800px) {
              .md\:font-medium {
                font-weight: 500;
              }
            }
            "#,
        ),
    )
    .await?;

    process.stop().await?;
    Ok(())
}

pub async fn css_changes(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.html", &html(r#"<div class="btn font-bold"></div>"#))
        .await?;

    let mut process = ctx.spawn(WATCH)?;

    ctx.wait_for_output_file_creation(OUTPUT_CSS).await?;
    ctx.expect_output_css(OUTPUT_CSS, &css(FONT_BOLD)).await?;

    let rounded = css(
        r#"
        @tailwind base;
        @tailwind components;
        @tailwind utilities;

        @layer components {
          .btn {
            @apply rounded px-2 py-1;
          }
        }
        "#,
    );
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.write_input_file("index.css", &rounded))
        .await?;
    ctx.expect_output_css(
        OUTPUT_CSS,
        &css(
            r#"
            .btn {
              border-radius: 0.25rem;
              padding: 0.25rem 0.5rem;
            }

            .font-bold {
              font-weight: 700;
            }
            "#,
        ),
    )
    .await?;

    let red = css(
        r#"
        @tailwind base;
        @tailwind components;
        @tailwind utilities;

        @layer components {
          .btn {
            @apply rounded bg-red-500 px-2 py-1;
          }
        }
        "#,
    );
    ctx.wait_for_output_file_change(OUTPUT_CSS, || ctx.write_input_file("index.css", &red))
        .await?;
    let expected = css(ctx.mode().pick(
        r#"
        .btn {
          border-radius: 0.25rem;
          --tw-bg-opacity: 1;
          background-color: rgb(239 68 68 / var(--tw-bg-opacity));
          padding-left: 0.5rem;
          padding-right: 0.5rem;
          padding-top: 0.25rem;
          padding-bottom: 0.25rem;
        }
        .font-bold {
          font-weight: 700;
        }
        "#,
        r#"
        .btn {
          background-color: #ef4444;
          border-radius: 0.25rem;
          padding: 0.25rem 0.5rem;
        }
        .font-bold {
          font-weight: 700;
        }
        "#,
    ));
    ctx.expect_output_css(OUTPUT_CSS, &expected).await?;

    process.stop().await?;
    Ok(())
}

pub async fn safelist(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.html", &html(r#"<div class="font-bold"></div>"#))
        .await?;
    ctx.write_input_file(
        CONFIG_JS,
        &javascript(
            r#"
            module.exports = {
              content: {
                files: ['./src/index.html'],
              },
              safelist: ['bg-red-500','bg-red-600'],
              theme: {
                extend: {
                },
              },
              corePlugins: {
                preflight: false,
              },
              plugins: [],
            }
            "#,
        ),
    )
    .await?;

    let mut process = ctx.spawn(WATCH)?;

    ctx.wait_for_output_file_creation(OUTPUT_CSS).await?;
    let expected = css(ctx.mode().pick(
        r#"
        .bg-red-500 {
          --tw-bg-opacity: 1;
          background-color: rgb(239 68 68 / var(--tw-bg-opacity));
        }

        .bg-red-600 {
          --tw-bg-opacity: 1;
          background-color: rgb(220 38 38 / var(--tw-bg-opacity));
        }

        .font-bold {
          font-weight: 700;
        }
        "#,
        r#"
        .bg-red-500 {
          background-color: #ef4444;
        }

        .bg-red-600 {
          background-color: #dc2626;
        }

        .font-bold {
          font-weight: 700;
        }
        "#,
    ));
    ctx.expect_output_css(OUTPUT_CSS, &expected).await?;

    process.stop().await?;
    Ok(())
}
