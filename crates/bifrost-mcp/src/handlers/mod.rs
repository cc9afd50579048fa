mod hierarchy;
mod navigation;
mod rename;
mod symbols;
