mod backup;
mod helpers;
mod metadata;
mod plan;
mod recipe;
mod remote;
mod shop;

pub(crate) use backup::{cmd_export, cmd_import};
pub(crate) use helpers::parse_date;
pub(crate) use metadata::{cmd_cooked, cmd_rate, cmd_status, cmd_tag};
pub(crate) use plan::{cmd_plan_add, cmd_plan_remove, cmd_plan_show};
pub(crate) use recipe::{
    RecipeArgs, cmd_recipe_add, cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_import,
    cmd_recipe_list, cmd_recipe_show,
};
pub(crate) use remote::{
    RemoteArgs, cmd_clear_local, cmd_remote_clear, cmd_remote_configure, cmd_remote_disconnect,
    cmd_remote_migrate, cmd_remote_status,
};
pub(crate) use shop::{
    cmd_shop_check, cmd_shop_delete, cmd_shop_generate, cmd_shop_list, cmd_shop_show,
    cmd_shop_status,
};
