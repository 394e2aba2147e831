use anyhow::Result;
use async_trait::async_trait;

use bot_core::{Plugin, PluginContext, PluginSpec, reply};
use price_watch::{PriceBoard, PriceState, clock, value_or_na};

pub const NOT_CHECKED: &str = "The dollar quote has not been checked yet.";

#[derive(Debug, Clone)]
pub struct Dolar {
    board: PriceBoard,
}

impl Dolar {
    #[must_use]
    pub const fn new(board: PriceBoard) -> Self {
        Self { board }
    }
}

#[must_use]
pub fn render(state: &PriceState) -> String {
    if !state.checked_once {
        return NOT_CHECKED.to_owned();
    }
    let when = state.checked_at.map_or_else(|| "never".to_owned(), clock);
    let mut out = format!(
        "*Dollar quote ({when})*\nBuy: ${}\nSell: *${}*",
        value_or_na(state.buy),
        value_or_na(state.sell),
    );
    if let Some(err) = &state.error {
        out.push_str("\n\n_Last check failed:_ ");
        out.push_str(err);
    }
    out
}

#[async_trait]
impl Plugin for Dolar {
    fn id(&self) -> &'static str {
        "dolar"
    }

    fn help(&self) -> &'static str {
        "Show the latest dollar quote"
    }

    fn spec(&self) -> PluginSpec {
        PluginSpec::new("dolar", &["/dolar"])
    }

    async fn run(&self, ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
        let state = self.board.snapshot().await;
        reply(ctx, render(&state)).await
    }
}
