// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use asterius_operator::types::{AzureStaticHost, StaticHost, StaticProxy};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let documents = [
        to_yaml::<AzureStaticHost>()?,
        to_yaml::<StaticHost>()?,
        to_yaml::<StaticProxy>()?,
    ];
    print!("{}", documents.join("---\n"));
    Ok(())
}

fn to_yaml<C>() -> anyhow::Result<String>
where
    C: CustomResourceExt,
{
    let crd = C::crd();
    Ok(serde_yaml::to_string(&crd)?)
}
