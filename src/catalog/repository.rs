use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::catalog::models::{
    Adicional, AdicionalRow, Bebida, Combo, ComboRow, FixedCost, IngredientBase, IngredientRow,
    Insumo, InsumoRow, Personalizacao, PersonalizacaoRow, Product, ProductRow, VariableCost,
};
use crate::db::StoreError;

/// Read access to the catalog plus the derived-but-stored price fields
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn ingredient(&self, id: i32) -> Result<Option<IngredientBase>, StoreError>;
    async fn insumo(&self, id: i32) -> Result<Option<Insumo>, StoreError>;
    async fn insumos_for_ingredient(&self, ingredient_id: i32) -> Result<Vec<Insumo>, StoreError>;
    async fn product(&self, id: i32) -> Result<Option<Product>, StoreError>;
    async fn products(&self) -> Result<Vec<Product>, StoreError>;
    async fn drink(&self, id: i32) -> Result<Option<Bebida>, StoreError>;
    async fn drinks(&self) -> Result<Vec<Bebida>, StoreError>;
    async fn combo(&self, id: i32) -> Result<Option<Combo>, StoreError>;
    async fn combos(&self) -> Result<Vec<Combo>, StoreError>;
    async fn adicionais(&self) -> Result<Vec<Adicional>, StoreError>;
    async fn personalizacoes(&self) -> Result<Vec<Personalizacao>, StoreError>;
    async fn fixed_costs(&self) -> Result<Vec<FixedCost>, StoreError>;
    async fn variable_costs(&self) -> Result<Vec<VariableCost>, StoreError>;

    /// Number of active products, the divisor of the rated fixed cost
    async fn active_product_count(&self) -> Result<i64, StoreError> {
        Ok(self.products().await?.iter().filter(|p| p.active).count() as i64)
    }

    async fn update_product_pricing(
        &self,
        product_id: i32,
        cmv: Decimal,
        margin_pct: Decimal,
    ) -> Result<bool, StoreError>;

    async fn update_combo_pricing(
        &self,
        combo_id: i32,
        final_price: Decimal,
        marketplace_price: Option<Decimal>,
    ) -> Result<bool, StoreError>;
}

const PRODUCT_COLUMNS: &str = "id, name, category, description, image, insumos, cmv, sale_price, \
     margin_pct, marketplace_price, active";

const COMBO_COLUMNS: &str = "id, name, description, image, products, drinks, discount_pct, \
     final_price, marketplace_price, adicional_ids, personalizacao_ids, active";

fn decode<R, T>(row: R) -> Result<T, StoreError>
where
    T: TryFrom<R, Error = String>,
{
    T::try_from(row).map_err(StoreError::InvalidRow)
}

/// Postgres-backed catalog
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn ingredient(&self, id: i32) -> Result<Option<IngredientBase>, StoreError> {
        let row = sqlx::query_as::<_, IngredientRow>(
            "SELECT id, name, category, unit, nominal_price, supplier FROM ingredients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode).transpose()
    }

    async fn insumo(&self, id: i32) -> Result<Option<Insumo>, StoreError> {
        let row = sqlx::query_as::<_, InsumoRow>(
            r#"
            SELECT id, name, ingredient_base_id, yield_quantity, unit, category, unit_price
            FROM insumos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode).transpose()
    }

    async fn insumos_for_ingredient(&self, ingredient_id: i32) -> Result<Vec<Insumo>, StoreError> {
        let rows = sqlx::query_as::<_, InsumoRow>(
            r#"
            SELECT id, name, ingredient_base_id, yield_quantity, unit, category, unit_price
            FROM insumos
            WHERE ingredient_base_id = $1
            ORDER BY id
            "#,
        )
        .bind(ingredient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn product(&self, id: i32) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products ORDER BY category, name",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn drink(&self, id: i32) -> Result<Option<Bebida>, StoreError> {
        let drink = sqlx::query_as::<_, Bebida>(
            "SELECT id, name, category, cost, sale_price, image, active FROM bebidas WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(drink)
    }

    async fn drinks(&self) -> Result<Vec<Bebida>, StoreError> {
        let drinks = sqlx::query_as::<_, Bebida>(
            "SELECT id, name, category, cost, sale_price, image, active FROM bebidas ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(drinks)
    }

    async fn combo(&self, id: i32) -> Result<Option<Combo>, StoreError> {
        let row = sqlx::query_as::<_, ComboRow>(&format!(
            "SELECT {} FROM combos WHERE id = $1",
            COMBO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Combo::from))
    }

    async fn combos(&self) -> Result<Vec<Combo>, StoreError> {
        let rows = sqlx::query_as::<_, ComboRow>(&format!(
            "SELECT {} FROM combos ORDER BY name",
            COMBO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Combo::from).collect())
    }

    async fn adicionais(&self) -> Result<Vec<Adicional>, StoreError> {
        let rows = sqlx::query_as::<_, AdicionalRow>(
            "SELECT id, name, price, insumo_id, categories FROM adicionais ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Adicional::from).collect())
    }

    async fn personalizacoes(&self) -> Result<Vec<Personalizacao>, StoreError> {
        let rows = sqlx::query_as::<_, PersonalizacaoRow>(
            "SELECT id, name, kind, categories FROM personalizacoes ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn fixed_costs(&self) -> Result<Vec<FixedCost>, StoreError> {
        let costs = sqlx::query_as::<_, FixedCost>("SELECT id, name, monthly_amount FROM fixed_costs")
            .fetch_all(&self.pool)
            .await?;

        Ok(costs)
    }

    async fn variable_costs(&self) -> Result<Vec<VariableCost>, StoreError> {
        let costs = sqlx::query_as::<_, VariableCost>("SELECT id, name, percentage FROM variable_costs")
            .fetch_all(&self.pool)
            .await?;

        Ok(costs)
    }

    async fn active_product_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE active")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn update_product_pricing(
        &self,
        product_id: i32,
        cmv: Decimal,
        margin_pct: Decimal,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE products SET cmv = $1, margin_pct = $2 WHERE id = $3")
            .bind(cmv)
            .bind(margin_pct)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_combo_pricing(
        &self,
        combo_id: i32,
        final_price: Decimal,
        marketplace_price: Option<Decimal>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE combos SET final_price = $1, marketplace_price = $2 WHERE id = $3")
            .bind(final_price)
            .bind(marketplace_price)
            .bind(combo_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
