//! crowdgate names - State, action and observation names

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::model::PomdpModel;

#[derive(Args, Debug)]
pub struct NamesArgs {}

pub fn run(ctx: &AppContext, _args: &NamesArgs) -> Result<()> {
    let model = PomdpModel::from_config(&ctx.config.model)?;
    let rows = model.spaces.names();
    if ctx.robot_mode() {
        return emit_robot(&robot_ok(rows));
    }

    let mut layout = HumanLayout::new();
    layout.section("Names");
    for row in rows {
        let gold = match row.uses_gold {
            Some(true) => "gold",
            Some(false) | None => "",
        };
        layout.push_line(format!("{:<12} {:>4}  {:<12} {gold}", row.kind, row.i, row.s));
    }
    emit_human(layout);
    Ok(())
}
