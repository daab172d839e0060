mod inspect_commands;
mod session_ops;
